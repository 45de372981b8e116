//! Mapper factory registry.

use kc_core::Config;
use kc_spi::{Capabilities, FactoryRegistry, SpiError};

use crate::descriptor::MapperDescriptor;
use crate::mapper::MapperFactory;
use crate::mappers::{
    AttributeImporterFactory, AttributeToRoleFactory, ExternalRoleToRoleFactory,
    HardcodedAttributeFactory, HardcodedRoleFactory, UsernameTemplateFactory,
};

/// Mapper factories by type id.
pub type MapperRegistry = FactoryRegistry<dyn MapperFactory>;

/// Returns one instance of every built-in mapper factory.
#[must_use]
pub fn builtin_factories() -> Vec<Box<dyn MapperFactory>> {
    vec![
        Box::new(AttributeImporterFactory),
        Box::new(HardcodedAttributeFactory),
        Box::new(HardcodedRoleFactory::default()),
        Box::new(AttributeToRoleFactory::default()),
        Box::new(ExternalRoleToRoleFactory::default()),
        Box::new(UsernameTemplateFactory::default()),
    ]
}

/// Registers `factories` with their scopes from `config`, then freezes.
///
/// ## Errors
///
/// Returns the first registration or `post_init` failure. Factories already
/// registered are closed.
pub fn bootstrap_with(
    config: &Config,
    capabilities: &Capabilities,
    factories: Vec<Box<dyn MapperFactory>>,
) -> Result<MapperRegistry, SpiError> {
    let registry = MapperRegistry::new();
    for factory in factories {
        let scope = config.factory_scope(factory.id());
        if let Err(err) = registry.register(factory, scope) {
            registry.close();
            return Err(err);
        }
    }
    registry.post_init(capabilities)?;
    Ok(registry)
}

/// Builds a ready registry holding the built-in mapper types.
///
/// ## Errors
///
/// Returns an error if a factory rejects its configuration scope.
pub fn bootstrap(config: &Config, capabilities: &Capabilities) -> Result<MapperRegistry, SpiError> {
    bootstrap_with(config, capabilities, builtin_factories())
}

/// Describes every registered mapper type, in type id order.
#[must_use]
pub fn describe_all(registry: &MapperRegistry) -> Vec<MapperDescriptor> {
    registry.factories().iter().map(|f| f.describe()).collect()
}
