//! Error handling for the Keycloak Rust broker.
//!
//! ## NIST 800-53 Rev5: SI-11 (Error Handling)
//!
//! Error messages are informative for operators while not exposing
//! identity data to end users.

use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
