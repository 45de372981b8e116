//! Maps an external role or group to a local role.

use kc_spi::{FactoryConfig, ProviderFactory, RegistryHandle, SpiError};

use super::check_role;
use crate::capability::SharedRoleCatalog;
use crate::config::MapperConfig;
use crate::descriptor::{ConfigProperty, MapperDescriptor, CATEGORY_ROLE_IMPORTER};
use crate::error::{ConfigError, MapperResult};
use crate::mapper::{Mapper, MapperContext, MapperFactory};
use crate::mutation::MutationSet;

/// Type id.
pub const TYPE_ID: &str = "external-role-to-role";

/// Config key for the external role or group.
pub const EXTERNAL_ROLE: &str = "external.role";

/// Config key for the local role.
pub const ROLE: &str = "role";

/// Factory for [`ExternalRoleToRoleMapper`].
#[derive(Debug, Default)]
pub struct ExternalRoleToRoleFactory {
    catalog: Option<SharedRoleCatalog>,
}

impl ProviderFactory for ExternalRoleToRoleFactory {
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

impl MapperFactory for ExternalRoleToRoleFactory {
    fn describe(&self) -> MapperDescriptor {
        MapperDescriptor::new(
            TYPE_ID,
            "External Role to Role",
            CATEGORY_ROLE_IMPORTER,
            "Looks for an external role or group in the assertion. If it exists, grants the user the specified realm role.",
        )
        .with_property(
            ConfigProperty::string(EXTERNAL_ROLE, "External Role")
                .required()
                .with_help("External role or group to look for."),
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
        Ok(Box::new(ExternalRoleToRoleMapper {
            external_role: validated.require(EXTERNAL_ROLE)?.to_string(),
            role: role.to_string(),
        }))
    }
}

/// Grants a role while the provider asserts an external role.
#[derive(Debug, Clone)]
pub struct ExternalRoleToRoleMapper {
    external_role: String,
    role: String,
}

impl Mapper for ExternalRoleToRoleMapper {
    fn import_attributes(&self, ctx: &MapperContext<'_>) -> MapperResult<MutationSet> {
        let mut set = MutationSet::new();
        if ctx.identity.has_role(&self.external_role) {
            set.grant_role(self.role.clone());
        }
        Ok(set)
    }

    fn update_attributes(
        &self,
        ctx: &MapperContext<'_>,
        _previous: &MutationSet,
    ) -> MapperResult<MutationSet> {
        let mut set = MutationSet::new();
        if ctx.identity.has_role(&self.external_role) {
            set.grant_role(self.role.clone());
        } else {
            set.revoke_role(self.role.clone());
        }
        Ok(set)
    }
}
