//! CLI configuration.

use std::path::{Path, PathBuf};

use kc_core::Config;
use serde::{Deserialize, Serialize};

/// Loaded broker configuration and where it came from.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,

    /// Broker configuration.
    pub broker: Config,
}

impl CliConfig {
    /// Loads the broker configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used when present and built-in defaults otherwise.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> crate::CliResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    return Ok(Self {
                        source: None,
                        broker: Config::default(),
                    })
                }
            },
        };

        let broker = Config::load(&path)?;
        tracing::debug!(path = %path.display(), "broker configuration loaded");
        Ok(Self {
            source: Some(path),
            broker,
        })
    }

    /// Gets the default configuration file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".keycloak").join("kcb.toml"))
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}
