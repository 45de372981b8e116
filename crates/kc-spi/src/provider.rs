//! Provider factory traits for the SPI system.

use std::collections::BTreeMap;
use std::fmt::Debug;

use thiserror::Error;

use crate::capability::RegistryHandle;
use crate::registry::RegistryPhase;

/// Error type for SPI operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpiError {
    /// A factory with the same id is already registered.
    #[error("duplicate provider: {0}")]
    DuplicateProvider(String),

    /// Provider not found.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// Registration attempted after the registry was frozen.
    #[error("registry is frozen, cannot register {0}")]
    RegistryFrozen(String),

    /// Lookup attempted before the registry became ready.
    #[error("registry is not ready (phase: {0})")]
    NotReady(RegistryPhase),

    /// Provider initialization failed.
    #[error("provider {id} failed to initialize: {message}")]
    InitializationFailed {
        /// Factory id.
        id: String,
        /// Failure description.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SpiError {
    /// Creates an initialization failure for a factory.
    pub fn init_failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            id: id.into(),
            message: message.into(),
        }
    }
}

/// Factory for providers of one type.
///
/// Factories are process-wide singletons registered under a stable id.
///
/// ## Lifecycle
///
/// 1. `init()` - called once at registration with the factory's scope
/// 2. `post_init()` - called after all factories are initialized
/// 3. provider creation - defined by the extending trait
/// 4. `close()` - called at shutdown
///
/// None of the hooks has a default body; every factory states what it does
/// at each step, even if that is nothing.
pub trait ProviderFactory: Send + Sync + Debug {
    /// Returns the unique identifier for this factory.
    fn id(&self) -> &'static str;

    /// Initializes the factory with its configuration scope.
    ///
    /// ## Errors
    ///
    /// Returns an error if the scope holds invalid settings.
    fn init(&mut self, scope: &dyn FactoryConfig) -> Result<(), SpiError>;

    /// Called after all factories have been initialized.
    ///
    /// Use this for wiring that depends on sibling factories or shared
    /// capabilities.
    ///
    /// ## Errors
    ///
    /// Returns an error if a required capability is missing.
    fn post_init(&mut self, handle: &RegistryHandle<'_>) -> Result<(), SpiError>;

    /// Called when the factory is being shut down.
    fn close(&self);
}

/// Configuration interface for factory initialization.
pub trait FactoryConfig: Send + Sync {
    /// Gets a string configuration value.
    fn get(&self, key: &str) -> Option<&str>;

    /// Gets an integer configuration value.
    fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Gets a boolean configuration value.
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

impl FactoryConfig for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        BTreeMap::get(self, key).map(String::as_str)
    }
}

/// A configuration scope with no entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScope;

impl FactoryConfig for EmptyScope {
    fn get(&self, _key: &str) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_scope_parses_typed_values() {
        let scope: BTreeMap<String, String> = [
            ("max-length".to_string(), " 32 ".to_string()),
            ("strict".to_string(), "true".to_string()),
            ("broken".to_string(), "nope".to_string()),
        ]
        .into_iter()
        .collect();

        assert_eq!(scope.get_int("max-length", 255), 32);
        assert_eq!(scope.get_int("broken", 7), 7);
        assert_eq!(scope.get_int("missing", 9), 9);
        assert!(scope.get_bool("strict", false));
        assert!(scope.get_bool("missing", true));
    }

    #[test]
    fn empty_scope_returns_defaults() {
        assert_eq!(EmptyScope.get("anything"), None);
        assert_eq!(EmptyScope.get_int("n", 3), 3);
    }

    #[test]
    fn errors_render_factory_id() {
        let err = SpiError::init_failed("username-template", "max-length must be positive");
        assert_eq!(
            err.to_string(),
            "provider username-template failed to initialize: max-length must be positive"
        );

        let err = SpiError::NotReady(RegistryPhase::Registering);
        assert_eq!(err.to_string(), "registry is not ready (phase: registering)");
    }
}
