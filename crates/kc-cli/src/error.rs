//! CLI error types.

use kc_broker::SyncError;
use kc_spi::SpiError;
use thiserror::Error;

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Resource not found.
    #[error("{resource_type} not found: {id}")]
    NotFound {
        /// Type of resource.
        resource_type: String,
        /// Resource identifier.
        id: String,
    },

    /// An input file could not be parsed.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File path.
        path: String,
        /// Parser message.
        message: String,
    },

    /// Mapper registry error.
    #[error("registry error: {0}")]
    Registry(#[from] SpiError),

    /// Sync error.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Creates a parse error for a file.
    #[must_use]
    pub fn parse(path: &std::path::Path, message: impl ToString) -> Self {
        Self::Parse {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(resource_type: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.to_string(),
            id: id.into(),
        }
    }
}

impl From<kc_core::Error> for CliError {
    fn from(err: kc_core::Error) -> Self {
        match err {
            kc_core::Error::Io(e) => Self::Io(e),
            kc_core::Error::Config(message) => Self::Config(message),
        }
    }
}

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_config_error_keeps_single_prefix() {
        let err = CliError::from(kc_core::Error::Config("bad toml".to_string()));
        assert_eq!(err.to_string(), "configuration error: bad toml");
    }
}
