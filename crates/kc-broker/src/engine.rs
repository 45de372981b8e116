//! Brokered login synchronization.
//!
//! ## Flow
//!
//! 1. The first login is the one without an existing user; a user is seeded
//!    from the external identity.
//! 2. [`SyncModePolicy`] picks the phase. With [`Phase::None`] the existing
//!    user is returned as is.
//! 3. Every enabled mapper is resolved and created in ordinal order. Any
//!    failure aborts the login before a mapper runs. The bound link is kept
//!    and reused until the link's configuration changes.
//! 4. Mappers run in ordinal order; on update each one sees the mutations of
//!    the mappers before it.
//! 5. The accumulated [`MutationSet`] is resolved and applied once.

use std::sync::Arc;

use dashmap::DashMap;
use kc_core::event::{Event, EventType};
use kc_core::EngineConfig;
use kc_model::{ExternalIdentity, LocalUserSnapshot};
use kc_spi::{RegistryPhase, SpiError};
use uuid::Uuid;

use crate::config::{BrokerLink, MapperConfig, SyncMode};
use crate::error::{
    IntegrityFault, MapperRef, MapperResult, SyncError, SyncLocation, SyncResult,
};
use crate::mapper::{Mapper, MapperContext};
use crate::mutation::MutationSet;
use crate::policy::{Phase, SyncModePolicy};
use crate::registry::MapperRegistry;

// ============================================================================
// Engine
// ============================================================================

/// Runs a broker link's mappers for one login.
///
/// The engine holds no per-login state; share it freely across threads.
/// Links are bound once and cached by link id; clones share the cache.
#[derive(Debug, Clone)]
pub struct BrokerSyncEngine {
    registry: Arc<MapperRegistry>,
    settings: EngineConfig,
    links: Arc<DashMap<Uuid, BoundLink>>,
}

#[derive(Debug)]
struct BoundLink {
    link: BrokerLink,
    prepared: Arc<PreparedLink>,
}

impl BrokerSyncEngine {
    /// Creates an engine with default settings.
    #[must_use]
    pub fn new(registry: Arc<MapperRegistry>) -> Self {
        Self::with_settings(registry, EngineConfig::default())
    }

    /// Creates an engine with explicit settings.
    #[must_use]
    pub fn with_settings(registry: Arc<MapperRegistry>, settings: EngineConfig) -> Self {
        Self {
            registry,
            settings,
            links: Arc::new(DashMap::new()),
        }
    }

    /// Returns the mapper registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<MapperRegistry> {
        &self.registry
    }

    /// Returns the engine settings.
    #[must_use]
    pub const fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    /// Synchronizes a user for one login.
    ///
    /// ## Errors
    ///
    /// - [`SyncError::ConfigurationIntegrity`] if the link cannot be bound
    /// - [`SyncError::MapperExecution`] if a mapper fails
    ///
    /// Either way nothing is applied.
    pub fn sync(
        &self,
        identity: &ExternalIdentity,
        existing: Option<&LocalUserSnapshot>,
        link: &BrokerLink,
    ) -> SyncResult<LocalUserSnapshot> {
        self.run(identity, existing, link).map(|report| report.snapshot)
    }

    /// Synchronizes a user for one login and reports what happened.
    ///
    /// The phase is decided before any mapper is bound, so a login whose
    /// phase is [`Phase::None`] never touches the link's mappers.
    ///
    /// ## Errors
    ///
    /// Same as [`sync`](Self::sync).
    pub fn run(
        &self,
        identity: &ExternalIdentity,
        existing: Option<&LocalUserSnapshot>,
        link: &BrokerLink,
    ) -> SyncResult<SyncReport> {
        if existing.is_some() && SyncModePolicy::decide(link.sync_mode, false) == Phase::None {
            tracing::debug!(
                link_id = %link.id,
                sync_mode = %link.sync_mode,
                "sync mode skips subsequent logins"
            );
            return PreparedLink::unbound(link).run(identity, existing);
        }
        self.bind(link)?.run(identity, existing)
    }

    /// Returns the bound form of a link, binding it on first use or when its
    /// configuration changed since it was cached.
    ///
    /// ## Errors
    ///
    /// Returns [`SyncError::ConfigurationIntegrity`] if the registry is not
    /// ready or the link cannot be bound. Failed links are not cached.
    pub fn bind(&self, link: &BrokerLink) -> SyncResult<Arc<PreparedLink>> {
        let phase = self.registry.phase();
        if phase != RegistryPhase::Ready {
            return Err(integrity_failure(link, None, SpiError::NotReady(phase)));
        }

        if let Some(bound) = self.links.get(&link.id) {
            if bound.link == *link {
                return Ok(Arc::clone(&bound.prepared));
            }
        }

        let prepared = Arc::new(self.prepare(link)?);
        self.links.insert(
            link.id,
            BoundLink {
                link: link.clone(),
                prepared: Arc::clone(&prepared),
            },
        );
        tracing::debug!(link_id = %link.id, mappers = prepared.mappers.len(), "broker link bound");
        Ok(prepared)
    }

    /// Drops the cached binding of a deleted link.
    ///
    /// Returns true if one was cached.
    pub fn forget(&self, link_id: Uuid) -> bool {
        self.links.remove(&link_id).is_some()
    }

    /// Number of links currently bound.
    #[must_use]
    pub fn bound_links(&self) -> usize {
        self.links.len()
    }

    /// Binds and validates every enabled mapper of a link.
    ///
    /// The result can be reused for any number of logins as long as the
    /// link's configuration does not change.
    ///
    /// ## Errors
    ///
    /// Returns [`SyncError::ConfigurationIntegrity`] if a mapper type is
    /// unknown, a configuration is invalid, two mappers share an ordinal, or
    /// the link has too many mappers.
    pub fn prepare(&self, link: &BrokerLink) -> SyncResult<PreparedLink> {
        let enabled = link.enabled_mappers();

        if enabled.len() > self.settings.max_mappers_per_link {
            return Err(integrity_failure(
                link,
                None,
                IntegrityFault::TooManyMappers {
                    count: enabled.len(),
                    max: self.settings.max_mappers_per_link,
                },
            ));
        }

        if self.settings.reject_ordinal_ties {
            if let Some((first, second)) = link.find_ordinal_tie() {
                return Err(integrity_failure(
                    link,
                    Some(second),
                    IntegrityFault::OrdinalTie {
                        ordinal: second.ordinal,
                        other: first.id,
                    },
                ));
            }
        }

        let mut mappers = Vec::with_capacity(enabled.len());
        for config in enabled {
            let factory = self
                .registry
                .resolve(&config.mapper_type)
                .map_err(|e| integrity_failure(link, Some(config), e))?;
            let mapper = factory
                .create(config)
                .map_err(|e| integrity_failure(link, Some(config), e))?;

            tracing::debug!(
                link_id = %link.id,
                mapper_type = %config.mapper_type,
                ordinal = config.ordinal,
                "mapper bound"
            );
            mappers.push(BoundMapper {
                mapper_ref: mapper_ref(config),
                mapper,
            });
        }

        Ok(PreparedLink {
            link_id: link.id,
            realm_id: link.realm_id,
            provider_alias: link.provider_alias.clone(),
            sync_mode: link.sync_mode,
            mappers,
        })
    }
}

fn mapper_ref(config: &MapperConfig) -> MapperRef {
    MapperRef {
        id: config.id,
        type_id: config.mapper_type.clone(),
        ordinal: config.ordinal,
    }
}

fn integrity_failure(
    link: &BrokerLink,
    mapper: Option<&MapperConfig>,
    fault: impl Into<IntegrityFault>,
) -> SyncError {
    let err = SyncError::integrity(
        SyncLocation {
            link_id: link.id,
            realm_id: link.realm_id,
            provider_alias: link.provider_alias.clone(),
            mapper: mapper.map(mapper_ref),
        },
        fault,
    );
    tracing::warn!(link_id = %link.id, error = %err, "broker link rejected");
    err
}

// ============================================================================
// Prepared link
// ============================================================================

#[derive(Debug)]
struct BoundMapper {
    mapper_ref: MapperRef,
    mapper: Box<dyn Mapper>,
}

/// A broker link whose mappers are bound and validated.
#[derive(Debug)]
pub struct PreparedLink {
    link_id: Uuid,
    realm_id: Uuid,
    provider_alias: String,
    sync_mode: SyncMode,
    mappers: Vec<BoundMapper>,
}

/// Outcome of one synchronized login.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Phase that ran.
    pub phase: Phase,
    /// Whether the user was imported on this login.
    pub first_login: bool,
    /// Merged mutations, in canonical order.
    pub mutations: MutationSet,
    /// Number of mappers that ran.
    pub mappers_run: usize,
    /// Resulting user.
    pub snapshot: LocalUserSnapshot,
    /// Audit event for the login.
    pub event: Event,
}

impl PreparedLink {
    fn unbound(link: &BrokerLink) -> Self {
        Self {
            link_id: link.id,
            realm_id: link.realm_id,
            provider_alias: link.provider_alias.clone(),
            sync_mode: link.sync_mode,
            mappers: Vec::new(),
        }
    }

    /// Broker link id.
    #[must_use]
    pub const fn link_id(&self) -> Uuid {
        self.link_id
    }

    /// Sync mode of the link.
    #[must_use]
    pub const fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// Bound mappers in run order.
    pub fn mappers(&self) -> impl Iterator<Item = &MapperRef> {
        self.mappers.iter().map(|bound| &bound.mapper_ref)
    }

    /// Synchronizes a user and returns the resulting snapshot.
    ///
    /// ## Errors
    ///
    /// Returns [`SyncError::MapperExecution`] if a mapper fails.
    pub fn sync(
        &self,
        identity: &ExternalIdentity,
        existing: Option<&LocalUserSnapshot>,
    ) -> SyncResult<LocalUserSnapshot> {
        self.run(identity, existing).map(|report| report.snapshot)
    }

    /// Synchronizes a user and reports what happened.
    ///
    /// ## Errors
    ///
    /// Returns [`SyncError::MapperExecution`] if a mapper fails.
    pub fn run(
        &self,
        identity: &ExternalIdentity,
        existing: Option<&LocalUserSnapshot>,
    ) -> SyncResult<SyncReport> {
        let first_login = existing.is_none();
        let phase = SyncModePolicy::decide(self.sync_mode, first_login);
        let base = match existing {
            Some(user) => user.clone(),
            None => LocalUserSnapshot::seed(self.realm_id, &self.provider_alias, identity),
        };

        let ctx = MapperContext {
            identity,
            user: &base,
            realm_id: self.realm_id,
            provider_alias: &self.provider_alias,
            sync_mode: self.sync_mode,
        };
        let (accumulated, mappers_run) = match phase {
            Phase::Import => (
                self.collect(&ctx, phase, |mapper, ctx, _| mapper.import_attributes(ctx))?,
                self.mappers.len(),
            ),
            Phase::Update => (
                self.collect(&ctx, phase, |mapper, ctx, previous| {
                    mapper.update_attributes(ctx, previous)
                })?,
                self.mappers.len(),
            ),
            Phase::None => (MutationSet::new(), 0),
        };

        let resolved = accumulated.resolve();
        let mutations = resolved.to_mutation_set();
        let snapshot = resolved.apply(base);

        tracing::info!(
            link_id = %self.link_id,
            phase = %phase,
            mappers = mappers_run,
            mutations = mutations.len(),
            "brokered login synchronized"
        );

        let event = self.login_event(&snapshot, phase, first_login, mappers_run, &mutations);
        Ok(SyncReport {
            phase,
            first_login,
            mutations,
            mappers_run,
            snapshot,
            event,
        })
    }

    fn collect<F>(&self, ctx: &MapperContext<'_>, phase: Phase, run: F) -> SyncResult<MutationSet>
    where
        F: Fn(&dyn Mapper, &MapperContext<'_>, &MutationSet) -> MapperResult<MutationSet>,
    {
        let mut accumulated = MutationSet::new();
        for bound in &self.mappers {
            tracing::debug!(
                link_id = %self.link_id,
                mapper_type = %bound.mapper_ref.type_id,
                ordinal = bound.mapper_ref.ordinal,
                phase = %phase,
                "running mapper"
            );
            let produced = run(bound.mapper.as_ref(), ctx, &accumulated).map_err(|source| {
                let err = SyncError::execution(self.location(&bound.mapper_ref), source);
                tracing::warn!(
                    link_id = %self.link_id,
                    mapper_type = %bound.mapper_ref.type_id,
                    ordinal = bound.mapper_ref.ordinal,
                    phase = %phase,
                    error = %err,
                    "mapper failed, login not synchronized"
                );
                err
            })?;
            accumulated.extend(produced);
        }
        Ok(accumulated)
    }

    fn location(&self, mapper: &MapperRef) -> SyncLocation {
        SyncLocation {
            link_id: self.link_id,
            realm_id: self.realm_id,
            provider_alias: self.provider_alias.clone(),
            mapper: Some(mapper.clone()),
        }
    }

    fn login_event(
        &self,
        snapshot: &LocalUserSnapshot,
        phase: Phase,
        first_login: bool,
        mappers_run: usize,
        mutations: &MutationSet,
    ) -> Event {
        let event_type = if first_login {
            EventType::IdentityProviderFirstLogin
        } else {
            EventType::IdentityProviderLogin
        };
        Event::builder(event_type)
            .realm(self.realm_id)
            .user(snapshot.id)
            .identity_provider(self.provider_alias.clone())
            .detail("link_id", self.link_id.to_string())
            .detail("sync_mode", self.sync_mode.as_str())
            .detail("phase", phase.as_str())
            .detail("mappers", mappers_run.to_string())
            .detail("mutations", mutations.len().to_string())
            .build()
    }
}
