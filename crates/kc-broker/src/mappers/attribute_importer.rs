//! Copies an external attribute onto the local user.

use kc_spi::{FactoryConfig, ProviderFactory, RegistryHandle, SpiError};

use super::UserField;
use crate::config::MapperConfig;
use crate::descriptor::{ConfigProperty, MapperDescriptor, CATEGORY_ATTRIBUTE_IMPORTER};
use crate::error::{ConfigError, MapperResult};
use crate::mapper::{Mapper, MapperContext, MapperFactory};
use crate::mutation::{AttributeMode, MutationSet};

/// Type id.
pub const TYPE_ID: &str = "attribute-importer";

/// Config key for the external attribute or claim name.
pub const ATTRIBUTE: &str = "attribute";

/// Config key for the local attribute or profile field.
pub const USER_ATTRIBUTE: &str = "user.attribute";

/// Config key for deferring to earlier mappers on update.
pub const SKIP_IF_ALREADY_MAPPED: &str = "skip.if.already.mapped";

/// Factory for [`AttributeImporterMapper`].
#[derive(Debug, Default)]
pub struct AttributeImporterFactory;

impl ProviderFactory for AttributeImporterFactory {
    fn id(&self) -> &'static str {
        TYPE_ID
    }

    fn init(&mut self, _scope: &dyn FactoryConfig) -> Result<(), SpiError> {
        Ok(())
    }

    fn post_init(&mut self, _handle: &RegistryHandle<'_>) -> Result<(), SpiError> {
        Ok(())
    }

    fn close(&self) {}
}

impl MapperFactory for AttributeImporterFactory {
    fn describe(&self) -> MapperDescriptor {
        MapperDescriptor::new(
            TYPE_ID,
            "Attribute Importer",
            CATEGORY_ATTRIBUTE_IMPORTER,
            "Import declared claim or attribute if it exists in the assertion into the specified user property or attribute.",
        )
        .with_property(
            ConfigProperty::string(ATTRIBUTE, "Attribute Name")
                .required()
                .with_help("Name of the claim or attribute to search for in the assertion."),
        )
        .with_property(
            ConfigProperty::string(USER_ATTRIBUTE, "User Attribute Name")
                .required()
                .with_help(
                    "User attribute name to store the value. Use username, email, firstName \
                     or lastName to map to those predefined user properties.",
                ),
        )
        .with_property(
            ConfigProperty::boolean(SKIP_IF_ALREADY_MAPPED, "Skip If Already Mapped")
                .with_help("On update, leave the field alone if an earlier mapper wrote it."),
        )
    }

    fn create(&self, config: &MapperConfig) -> Result<Box<dyn Mapper>, ConfigError> {
        let validated = self.describe().validate(config)?;
        Ok(Box::new(AttributeImporterMapper {
            attribute: validated.require(ATTRIBUTE)?.to_string(),
            field: UserField::parse(validated.require(USER_ATTRIBUTE)?),
            skip_if_already_mapped: validated.get_bool(SKIP_IF_ALREADY_MAPPED),
        }))
    }
}

/// Copies one external attribute.
#[derive(Debug, Clone)]
pub struct AttributeImporterMapper {
    attribute: String,
    field: UserField,
    skip_if_already_mapped: bool,
}

impl Mapper for AttributeImporterMapper {
    fn import_attributes(&self, ctx: &MapperContext<'_>) -> MapperResult<MutationSet> {
        let mut set = MutationSet::new();
        if let Some(values) = ctx.identity.attribute(&self.attribute) {
            self.field.assign(&mut set, values, AttributeMode::Replace);
        }
        Ok(set)
    }

    fn update_attributes(
        &self,
        ctx: &MapperContext<'_>,
        previous: &MutationSet,
    ) -> MapperResult<MutationSet> {
        let mut set = MutationSet::new();
        if self.skip_if_already_mapped && self.field.is_touched_by(previous) {
            return Ok(set);
        }
        match ctx.identity.attribute(&self.attribute) {
            Some(values) => self.field.assign(&mut set, values, AttributeMode::Replace),
            // Profile fields are never cleared.
            None => self.field.assign(&mut set, &[], AttributeMode::RemoveIfAbsent),
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use kc_model::{ExternalIdentity, LocalUserSnapshot};
    use uuid::Uuid;

    use super::*;
    use crate::mappers::test_context;
    use crate::mutation::AttributeChange;

    fn mapper(user_attribute: &str, skip: bool) -> Box<dyn Mapper> {
        AttributeImporterFactory
            .create(
                &MapperConfig::new("m", TYPE_ID, 1)
                    .with_config(ATTRIBUTE, "dept")
                    .with_config(USER_ATTRIBUTE, user_attribute)
                    .with_config(SKIP_IF_ALREADY_MAPPED, skip.to_string()),
            )
            .unwrap()
    }

    #[test]
    fn import_copies_all_values() {
        let identity = ExternalIdentity::new("oidc", "s", "u")
            .with_attribute_values("dept", vec!["eng".to_string(), "ops".to_string()]);
        let user = LocalUserSnapshot::new(Uuid::nil(), "u");

        let set = mapper("department", false)
            .import_attributes(&test_context(&identity, &user))
            .unwrap();

        assert_eq!(
            set.resolve().attributes["department"],
            AttributeChange::Set(vec!["eng".to_string(), "ops".to_string()])
        );
    }

    #[test]
    fn import_skips_absent_attribute() {
        let identity = ExternalIdentity::new("oidc", "s", "u");
        let user = LocalUserSnapshot::new(Uuid::nil(), "u");

        let set = mapper("department", false)
            .import_attributes(&test_context(&identity, &user))
            .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn update_removes_attribute_no_longer_asserted() {
        let identity = ExternalIdentity::new("oidc", "s", "u");
        let user = LocalUserSnapshot::new(Uuid::nil(), "u")
            .with_attribute("department", vec!["eng".to_string()]);

        let set = mapper("department", false)
            .update_attributes(&test_context(&identity, &user), &MutationSet::new())
            .unwrap();

        assert!(set.resolve().apply(user).get_attribute("department").is_none());
    }

    #[test]
    fn update_keeps_profile_field_when_absent() {
        let identity = ExternalIdentity::new("oidc", "s", "u");
        let user = LocalUserSnapshot::new(Uuid::nil(), "u").with_email("old@example.com");

        let set = mapper("email", false)
            .update_attributes(&test_context(&identity, &user), &MutationSet::new())
            .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn skip_if_already_mapped_defers_to_earlier_mapper() {
        let identity = ExternalIdentity::new("oidc", "s", "u").with_attribute("dept", "eng");
        let user = LocalUserSnapshot::new(Uuid::nil(), "u");
        let ctx = test_context(&identity, &user);
        let mut previous = MutationSet::new();
        previous.set_attribute("department", vec!["sales".to_string()], AttributeMode::Replace);

        assert!(mapper("department", true)
            .update_attributes(&ctx, &previous)
            .unwrap()
            .is_empty());
        assert!(!mapper("department", false)
            .update_attributes(&ctx, &previous)
            .unwrap()
            .is_empty());
    }
}
