//! Command implementations.

pub mod link;
pub mod mappers;

use std::path::Path;
use std::sync::Arc;

pub use link::{run_sync, run_validate};
pub use mappers::{run_describe, run_mappers};

use kc_broker::registry::{self, MapperRegistry};
use kc_broker::{BrokerLink, BrokerSyncEngine, StaticRoleCatalog};
use kc_spi::Capabilities;
use serde::de::DeserializeOwned;

use crate::cli::CatalogArgs;
use crate::CliConfig;

/// Builds a ready mapper registry from the CLI configuration.
///
/// ## Errors
///
/// Returns an error if a factory rejects its configuration scope.
pub fn build_registry(config: &CliConfig, catalog: &CatalogArgs) -> crate::CliResult<MapperRegistry> {
    let mut capabilities = Capabilities::new();
    if !catalog.roles.is_empty() {
        let roles: StaticRoleCatalog = catalog.roles.iter().cloned().collect();
        capabilities.insert(roles.shared());
    }
    Ok(registry::bootstrap(&config.broker, &capabilities)?)
}

/// Builds a sync engine over a fresh registry.
///
/// ## Errors
///
/// Returns an error if the registry cannot be built.
pub fn build_engine(config: &CliConfig, catalog: &CatalogArgs) -> crate::CliResult<BrokerSyncEngine> {
    let registry = build_registry(config, catalog)?;
    Ok(BrokerSyncEngine::with_settings(
        Arc::new(registry),
        config.broker.engine,
    ))
}

/// Reads a broker link definition from a TOML file.
///
/// ## Errors
///
/// Returns an error if the file cannot be read or is not a link definition.
pub fn read_link(path: &Path) -> crate::CliResult<BrokerLink> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| crate::CliError::parse(path, e))
}

/// Reads a JSON document.
///
/// ## Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> crate::CliResult<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| crate::CliError::parse(path, e))
}
