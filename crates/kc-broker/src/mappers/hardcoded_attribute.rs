//! Sets a fixed value on a user attribute or profile field.

use kc_spi::{FactoryConfig, ProviderFactory, RegistryHandle, SpiError};

use super::UserField;
use crate::config::MapperConfig;
use crate::descriptor::{ConfigProperty, MapperDescriptor, CATEGORY_ATTRIBUTE_IMPORTER};
use crate::error::{ConfigError, MapperResult};
use crate::mapper::{Mapper, MapperContext, MapperFactory};
use crate::mutation::{AttributeMode, MutationSet};

/// Type id.
pub const TYPE_ID: &str = "hardcoded-attribute";

/// Config key for the target attribute.
pub const ATTRIBUTE: &str = "attribute";

/// Config key for the value.
pub const ATTRIBUTE_VALUE: &str = "attribute.value";

/// Factory for [`HardcodedAttributeMapper`].
#[derive(Debug, Default)]
pub struct HardcodedAttributeFactory;

impl ProviderFactory for HardcodedAttributeFactory {
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

impl MapperFactory for HardcodedAttributeFactory {
    fn describe(&self) -> MapperDescriptor {
        MapperDescriptor::new(
            TYPE_ID,
            "Hardcoded Attribute",
            CATEGORY_ATTRIBUTE_IMPORTER,
            "When user is imported from provider, hardcode a value to a specific user attribute.",
        )
        .with_property(
            ConfigProperty::string(ATTRIBUTE, "User Attribute")
                .required()
                .with_help("Name of user attribute you want to hardcode."),
        )
        .with_property(
            ConfigProperty::string(ATTRIBUTE_VALUE, "Attribute Value")
                .required()
                .with_help("Value you want to hardcode."),
        )
    }

    fn create(&self, config: &MapperConfig) -> Result<Box<dyn Mapper>, ConfigError> {
        let validated = self.describe().validate(config)?;
        Ok(Box::new(HardcodedAttributeMapper {
            field: UserField::parse(validated.require(ATTRIBUTE)?),
            value: validated.require(ATTRIBUTE_VALUE)?.to_string(),
        }))
    }
}

/// Writes one configured value.
#[derive(Debug, Clone)]
pub struct HardcodedAttributeMapper {
    field: UserField,
    value: String,
}

impl Mapper for HardcodedAttributeMapper {
    fn import_attributes(&self, _ctx: &MapperContext<'_>) -> MapperResult<MutationSet> {
        let mut set = MutationSet::new();
        self.field
            .assign(&mut set, std::slice::from_ref(&self.value), AttributeMode::Replace);
        Ok(set)
    }

    fn update_attributes(
        &self,
        ctx: &MapperContext<'_>,
        _previous: &MutationSet,
    ) -> MapperResult<MutationSet> {
        self.import_attributes(ctx)
    }
}

#[cfg(test)]
mod tests {
    use kc_model::{ExternalIdentity, LocalUserSnapshot};
    use uuid::Uuid;

    use super::*;
    use crate::mappers::test_context;

    #[test]
    fn writes_attribute_and_profile_field() {
        let identity = ExternalIdentity::new("saml", "s", "u");
        let user = LocalUserSnapshot::new(Uuid::nil(), "u");
        let ctx = test_context(&identity, &user);

        let mapper = HardcodedAttributeFactory
            .create(
                &MapperConfig::new("m", TYPE_ID, 1)
                    .with_config(ATTRIBUTE, "tenant")
                    .with_config(ATTRIBUTE_VALUE, "acme"),
            )
            .unwrap();
        let user = mapper.import_attributes(&ctx).unwrap().resolve().apply(user.clone());
        assert_eq!(user.get_first_attribute("tenant"), Some("acme"));

        let mapper = HardcodedAttributeFactory
            .create(
                &MapperConfig::new("m", TYPE_ID, 2)
                    .with_config(ATTRIBUTE, "lastName")
                    .with_config(ATTRIBUTE_VALUE, "Contractor"),
            )
            .unwrap();
        let set = mapper.update_attributes(&ctx, &MutationSet::new()).unwrap();
        assert_eq!(set.resolve().last_name.as_deref(), Some("Contractor"));
    }

    #[test]
    fn value_is_required() {
        let err = HardcodedAttributeFactory
            .create(&MapperConfig::new("m", TYPE_ID, 1).with_config(ATTRIBUTE, "tenant"))
            .unwrap_err();
        assert_eq!(err, ConfigError::missing(ATTRIBUTE_VALUE));
    }
}
