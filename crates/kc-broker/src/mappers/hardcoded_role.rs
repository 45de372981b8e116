//! Grants a fixed role on every run.

use kc_spi::{FactoryConfig, ProviderFactory, RegistryHandle, SpiError};

use super::check_role;
use crate::capability::SharedRoleCatalog;
use crate::config::MapperConfig;
use crate::descriptor::{ConfigProperty, MapperDescriptor, CATEGORY_ROLE_IMPORTER};
use crate::error::{ConfigError, MapperResult};
use crate::mapper::{Mapper, MapperContext, MapperFactory};
use crate::mutation::MutationSet;

/// Type id.
pub const TYPE_ID: &str = "hardcoded-role";

/// Config key for the granted role.
pub const ROLE: &str = "role";

/// Factory for [`HardcodedRoleMapper`].
#[derive(Debug, Default)]
pub struct HardcodedRoleFactory {
    catalog: Option<SharedRoleCatalog>,
}

impl ProviderFactory for HardcodedRoleFactory {
    fn id(&self) -> &'static str {
        TYPE_ID
    }

    fn init(&mut self, _scope: &dyn FactoryConfig) -> Result<(), SpiError> {
        Ok(())
    }

    fn post_init(&mut self, handle: &RegistryHandle<'_>) -> Result<(), SpiError> {
        self.catalog = handle.capability::<SharedRoleCatalog>().cloned();
        Ok(())
    }

    fn close(&self) {}
}

impl MapperFactory for HardcodedRoleFactory {
    fn describe(&self) -> MapperDescriptor {
        MapperDescriptor::new(
            TYPE_ID,
            "Hardcoded Role",
            CATEGORY_ROLE_IMPORTER,
            "When user is imported from provider, hardcode a role mapping for it.",
        )
        .with_property(
            ConfigProperty::role(ROLE, "Role")
                .required()
                .with_help("Role to grant to the user."),
        )
    }

    fn create(&self, config: &MapperConfig) -> Result<Box<dyn Mapper>, ConfigError> {
        let validated = self.describe().validate(config)?;
        let role = validated.require(ROLE)?;
        check_role(self.catalog.as_ref(), ROLE, role)?;
        Ok(Box::new(HardcodedRoleMapper {
            role: role.to_string(),
        }))
    }
}

/// Grants one configured role.
#[derive(Debug, Clone)]
pub struct HardcodedRoleMapper {
    role: String,
}

impl Mapper for HardcodedRoleMapper {
    fn import_attributes(&self, _ctx: &MapperContext<'_>) -> MapperResult<MutationSet> {
        let mut set = MutationSet::new();
        set.grant_role(self.role.clone());
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
