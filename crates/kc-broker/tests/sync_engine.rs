//! End-to-end tests for brokered login synchronization.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kc_broker::error::IntegrityFault;
use kc_broker::mutation::AttributeMode;
use kc_broker::registry::{self, MapperRegistry};
use kc_broker::{
    BrokerLink, BrokerSyncEngine, ConfigError, Mapper, MapperConfig, MapperContext,
    MapperDescriptor, MapperError, MapperFactory, MutationSet, StaticRoleCatalog, SyncMode,
};
use kc_core::Config;
use kc_model::{ExternalIdentity, LocalUserSnapshot};
use kc_spi::{Capabilities, FactoryConfig, ProviderFactory, RegistryHandle, SpiError};
use uuid::Uuid;

// ============================================================================
// Fixtures
// ============================================================================

fn realm() -> Uuid {
    Uuid::from_u128(0x0191_0000_0000_7000_8000_0000_0000_0001)
}

fn engine() -> BrokerSyncEngine {
    let registry = registry::bootstrap(&Config::default(), &Capabilities::new()).unwrap();
    BrokerSyncEngine::new(Arc::new(registry))
}

fn import_dept(ordinal: i32) -> MapperConfig {
    MapperConfig::new("dept", "attribute-importer", ordinal)
        .with_config("attribute", "dept")
        .with_config("user.attribute", "dept")
}

fn engineer_if_eng(ordinal: i32) -> MapperConfig {
    MapperConfig::new("engineer", "attribute-to-role", ordinal)
        .with_config("attribute", "dept")
        .with_config("attribute.value", "eng")
        .with_config("role", "engineer")
}

fn hardcoded(field: &str, value: &str, ordinal: i32) -> MapperConfig {
    MapperConfig::new(field, "hardcoded-attribute", ordinal)
        .with_config("attribute", field)
        .with_config("attribute.value", value)
}

fn alice(dept: &str) -> ExternalIdentity {
    ExternalIdentity::new("oidc", "sub-alice", "alice")
        .with_email("alice@example.com")
        .with_attribute("dept", dept)
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn sync_is_deterministic() {
    let engine = engine();
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force)
        .with_mapper(import_dept(1))
        .with_mapper(engineer_if_eng(2))
        .with_mapper(hardcoded("tenant", "acme", 3))
        .with_mapper(
            MapperConfig::new("username", "username-template", 4)
                .with_config("template", "${ALIAS}.${USERNAME | uppercase}"),
        );
    let identity = alice("eng");
    let existing = LocalUserSnapshot::new(realm(), "corp.ALICE").with_role("viewer");

    for existing in [None, Some(&existing)] {
        let first = engine.sync(&identity, existing, &link).unwrap();
        let second = engine.sync(&identity, existing, &link).unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }
}

#[test]
fn import_mode_subsequent_login_is_noop() {
    let link = BrokerLink::new(realm(), "corp", SyncMode::Import)
        .with_mapper(import_dept(1))
        .with_mapper(hardcoded("email", "changed@example.com", 2));
    let existing = LocalUserSnapshot::new(realm(), "alice")
        .with_email("alice@example.com")
        .with_attribute("dept", vec!["ops".to_string()])
        .with_role("engineer");

    let result = engine().sync(&alice("eng"), Some(&existing), &link).unwrap();

    assert_eq!(result, existing);
}

#[test]
fn later_mapper_wins_for_scalar_fields() {
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force)
        .with_mapper(hardcoded("email", "second@example.com", 2))
        .with_mapper(hardcoded("email", "first@example.com", 1));

    let user = engine().sync(&alice("eng"), None, &link).unwrap();

    assert_eq!(user.email.as_deref(), Some("second@example.com"));
}

#[test]
fn revoke_cancels_same_pass_grant_but_keeps_untouched_roles() {
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force)
        .with_mapper(
            MapperConfig::new("grant", "hardcoded-role", 1).with_config("role", "engineer"),
        )
        .with_mapper(
            MapperConfig::new("revoke", "external-role-to-role", 2)
                .with_config("external.role", "cn=engineers")
                .with_config("role", "engineer"),
        );
    let existing = LocalUserSnapshot::new(realm(), "alice").with_role("auditor");

    let user = engine().sync(&alice("eng"), Some(&existing), &link).unwrap();

    assert!(!user.has_role("engineer"));
    assert!(user.has_role("auditor"));
}

#[test]
fn first_login_seeds_from_identity() {
    let link = BrokerLink::new(realm(), "corp", SyncMode::Import);
    let identity = alice("eng").with_first_name("Alice").with_role("staff");

    let user = engine().sync(&identity, None, &link).unwrap();

    assert_eq!(user.id, None);
    assert_eq!(user.realm_id, realm());
    assert_eq!(user.username, "alice");
    assert_eq!(user.email.as_deref(), Some("alice@example.com"));
    assert!(user.first_name.is_none());
    assert!(user.attributes.is_empty());
    assert!(user.roles.is_empty());
    assert_eq!(
        user.get_federated_identity("corp").map(|fi| fi.user_id.as_str()),
        Some("sub-alice")
    );
}

#[test]
fn force_mode_resyncs_attribute_and_role() {
    let engine = engine();
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force)
        .with_mapper(import_dept(1))
        .with_mapper(engineer_if_eng(2));

    let first = engine.sync(&alice("eng"), None, &link).unwrap();
    assert_eq!(first.get_attribute("dept"), Some(&["eng".to_string()][..]));
    assert!(first.has_role("engineer"));

    let second = engine.sync(&alice("sales"), Some(&first), &link).unwrap();
    assert_eq!(second.get_attribute("dept"), Some(&["sales".to_string()][..]));
    assert!(!second.has_role("engineer"));
    assert_eq!(second.username, first.username);
}

#[test]
fn prepared_link_reports_merged_mutations() {
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force)
        .with_mapper(import_dept(1))
        .with_mapper(engineer_if_eng(2));
    let prepared = engine().prepare(&link).unwrap();

    let report = prepared.run(&alice("eng"), None).unwrap();

    let json = serde_json::to_value(&report.mutations).unwrap();
    assert_eq!(json[0]["op"], "set_attribute");
    assert_eq!(json[0]["key"], "dept");
    assert_eq!(json[1]["op"], "grant_role");
    assert_eq!(report.snapshot, prepared.sync(&alice("eng"), None).unwrap());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn missing_required_property_fails_create() {
    let registry = registry::bootstrap(&Config::default(), &Capabilities::new()).unwrap();
    let factory = registry.resolve("attribute-to-role").unwrap();

    let result = factory.create(
        &MapperConfig::new("no-role", "attribute-to-role", 1)
            .with_config("attribute", "dept")
            .with_config("attribute.value", "eng"),
    );

    assert_eq!(result.unwrap_err(), ConfigError::missing("role"));
}

#[test]
fn invalid_config_aborts_whole_sync() {
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force)
        .with_mapper(import_dept(1))
        .with_mapper(MapperConfig::new("no-role", "hardcoded-role", 2));

    let err = engine().sync(&alice("eng"), None, &link).unwrap_err();

    assert!(err.is_configuration_error());
    assert!(matches!(err.fault(), Some(IntegrityFault::InvalidConfig(_))));
    let mapper = err.location().mapper.as_ref().unwrap();
    assert_eq!(mapper.type_id, "hardcoded-role");
    assert_eq!(mapper.ordinal, 2);
    assert_eq!(err.location().provider_alias, "corp");
}

#[test]
fn unknown_mapper_type_is_integrity_fault() {
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force)
        .with_mapper(MapperConfig::new("mystery", "no-such-mapper", 1));

    let err = engine().sync(&alice("eng"), None, &link).unwrap_err();

    assert_eq!(
        err.fault(),
        Some(&IntegrityFault::UnknownMapperType("no-such-mapper".to_string()))
    );
}

#[test]
fn role_catalog_rejects_unknown_roles() {
    let caps = Capabilities::new().with(
        ["engineer"]
            .into_iter()
            .collect::<StaticRoleCatalog>()
            .shared(),
    );
    let registry = registry::bootstrap(&Config::default(), &caps).unwrap();
    let engine = BrokerSyncEngine::new(Arc::new(registry));

    let ok = BrokerLink::new(realm(), "corp", SyncMode::Force).with_mapper(engineer_if_eng(1));
    assert!(engine.prepare(&ok).is_ok());

    let bad = BrokerLink::new(realm(), "corp", SyncMode::Force).with_mapper(
        MapperConfig::new("ghost", "hardcoded-role", 1).with_config("role", "ghost"),
    );
    assert!(engine.prepare(&bad).unwrap_err().is_configuration_error());
}

#[test]
fn mapper_failure_applies_nothing() {
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force)
        .with_mapper(hardcoded("tenant", "acme", 1))
        .with_mapper(
            MapperConfig::new("username", "username-template", 2)
                .with_config("template", "${ATTRIBUTE.employeeNumber}"),
        );

    let err = engine().sync(&alice("eng"), None, &link).unwrap_err();

    assert!(err.is_mapper_error());
    assert_eq!(err.location().mapper.as_ref().map(|m| m.ordinal), Some(2));
    assert!(err.to_string().contains("ATTRIBUTE.employeeNumber"));
}

// ============================================================================
// Custom mapper types
// ============================================================================

/// Appends the sync mode to an attribute so LEGACY and IMPORT are visible.
#[derive(Debug, Default)]
struct ModeTagFactory;

#[derive(Debug)]
struct ModeTagMapper;

impl ProviderFactory for ModeTagFactory {
    fn id(&self) -> &'static str {
        "mode-tag"
    }

    fn init(&mut self, _scope: &dyn FactoryConfig) -> Result<(), SpiError> {
        Ok(())
    }

    fn post_init(&mut self, _handle: &RegistryHandle<'_>) -> Result<(), SpiError> {
        Ok(())
    }

    fn close(&self) {}
}

impl MapperFactory for ModeTagFactory {
    fn describe(&self) -> MapperDescriptor {
        MapperDescriptor::new("mode-tag", "Mode Tag", "Test", "Records the sync mode.")
    }

    fn create(&self, _config: &MapperConfig) -> Result<Box<dyn Mapper>, ConfigError> {
        Ok(Box::new(ModeTagMapper))
    }
}

impl Mapper for ModeTagMapper {
    fn import_attributes(&self, ctx: &MapperContext<'_>) -> Result<MutationSet, MapperError> {
        let mut set = MutationSet::new();
        set.set_attribute(
            "modes",
            vec![ctx.sync_mode.to_string()],
            AttributeMode::Append,
        );
        Ok(set)
    }

    fn update_attributes(
        &self,
        ctx: &MapperContext<'_>,
        _previous: &MutationSet,
    ) -> Result<MutationSet, MapperError> {
        self.import_attributes(ctx)
    }
}

fn registry_with_custom() -> MapperRegistry {
    let mut factories = registry::builtin_factories();
    factories.push(Box::new(ModeTagFactory));
    registry::bootstrap_with(&Config::default(), &Capabilities::new(), factories).unwrap()
}

#[test]
fn mappers_see_legacy_mode() {
    let engine = BrokerSyncEngine::new(Arc::new(registry_with_custom()));
    let link = BrokerLink::new(realm(), "corp", SyncMode::Legacy)
        .with_mapper(MapperConfig::new("tag", "mode-tag", 1));

    let user = engine.sync(&alice("eng"), None, &link).unwrap();

    assert_eq!(user.get_first_attribute("modes"), Some("LEGACY"));
}

#[test]
fn update_appends_onto_existing_values() {
    let engine = BrokerSyncEngine::new(Arc::new(registry_with_custom()));
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force)
        .with_mapper(MapperConfig::new("tag", "mode-tag", 1));
    let existing =
        LocalUserSnapshot::new(realm(), "alice").with_attribute("modes", vec!["IMPORT".to_string()]);

    let user = engine.sync(&alice("eng"), Some(&existing), &link).unwrap();

    assert_eq!(
        user.get_attribute("modes"),
        Some(&["IMPORT".to_string(), "FORCE".to_string()][..])
    );
}

/// Counts how many mappers it has created.
#[derive(Debug, Default)]
struct CountingFactory {
    created: Arc<AtomicUsize>,
}

impl ProviderFactory for CountingFactory {
    fn id(&self) -> &'static str {
        "counting"
    }

    fn init(&mut self, _scope: &dyn FactoryConfig) -> Result<(), SpiError> {
        Ok(())
    }

    fn post_init(&mut self, _handle: &RegistryHandle<'_>) -> Result<(), SpiError> {
        Ok(())
    }

    fn close(&self) {}
}

impl MapperFactory for CountingFactory {
    fn describe(&self) -> MapperDescriptor {
        MapperDescriptor::new("counting", "Counting", "Test", "Counts creations.")
    }

    fn create(&self, _config: &MapperConfig) -> Result<Box<dyn Mapper>, ConfigError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ModeTagMapper))
    }
}

fn counting_engine() -> (BrokerSyncEngine, Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    let mut factories = registry::builtin_factories();
    factories.push(Box::new(CountingFactory {
        created: Arc::clone(&created),
    }));
    let registry =
        registry::bootstrap_with(&Config::default(), &Capabilities::new(), factories).unwrap();
    (BrokerSyncEngine::new(Arc::new(registry)), created)
}

#[test]
fn repeated_logins_create_mappers_once() {
    let (engine, created) = counting_engine();
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force)
        .with_mapper(MapperConfig::new("count", "counting", 1))
        .with_mapper(import_dept(2));

    let mut user = engine.sync(&alice("eng"), None, &link).unwrap();
    for _ in 0..4 {
        user = engine.sync(&alice("eng"), Some(&user), &link).unwrap();
    }

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(engine.bound_links(), 1);
    assert_eq!(user.get_attribute("modes"), Some(&["FORCE".to_string()][..]));
}

#[test]
fn edited_link_is_bound_again() {
    let (engine, created) = counting_engine();
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force)
        .with_mapper(MapperConfig::new("count", "counting", 1));
    engine.sync(&alice("eng"), None, &link).unwrap();

    let edited = link.clone().with_mapper(import_dept(2));
    engine.sync(&alice("eng"), None, &edited).unwrap();
    engine.sync(&alice("eng"), None, &edited).unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[test]
fn import_mode_repeat_login_never_binds() {
    let (engine, created) = counting_engine();
    let link = BrokerLink::new(realm(), "corp", SyncMode::Import)
        .with_mapper(MapperConfig::new("count", "counting", 1));
    let existing = LocalUserSnapshot::new(realm(), "alice");

    let report = engine.run(&alice("eng"), Some(&existing), &link).unwrap();

    assert_eq!(report.snapshot, existing);
    assert_eq!(created.load(Ordering::SeqCst), 0);
    assert_eq!(engine.bound_links(), 0);
}

// ============================================================================
// Registry lifecycle
// ============================================================================

#[test]
fn registry_is_frozen_after_bootstrap() {
    let registry = registry::bootstrap(&Config::default(), &Capabilities::new()).unwrap();

    let err = registry
        .register(Box::new(ModeTagFactory), &kc_spi::EmptyScope)
        .unwrap_err();
    assert_eq!(err, SpiError::RegistryFrozen("mode-tag".to_string()));

    registry.close();
    registry.close();
    let link = BrokerLink::new(realm(), "corp", SyncMode::Force).with_mapper(import_dept(1));
    let err = BrokerSyncEngine::new(Arc::new(registry))
        .sync(&alice("eng"), None, &link)
        .unwrap_err();
    assert!(matches!(err.fault(), Some(IntegrityFault::Registry(SpiError::NotReady(_)))));
}

#[test]
fn engine_is_shareable_across_threads() {
    let engine = Arc::new(engine());
    let link = Arc::new(
        BrokerLink::new(realm(), "corp", SyncMode::Force)
            .with_mapper(import_dept(1))
            .with_mapper(engineer_if_eng(2)),
    );

    let handles: Vec<_> = ["eng", "sales", "eng", "ops"]
        .into_iter()
        .map(|dept| {
            let engine = Arc::clone(&engine);
            let link = Arc::clone(&link);
            std::thread::spawn(move || engine.sync(&alice(dept), None, &link).unwrap())
        })
        .collect();

    let roles: Vec<bool> = handles
        .into_iter()
        .map(|h| h.join().unwrap().has_role("engineer"))
        .collect();
    assert_eq!(roles, vec![true, false, true, false]);
}
