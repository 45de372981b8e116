//! Configuration management for the Keycloak Rust broker.
//!
//! Configuration is read from a TOML document with two sections:
//!
//! ```toml
//! [engine]
//! max_mappers_per_link = 64
//! reject_ordinal_ties = true
//!
//! [factories."username-template"]
//! max-length = 128
//! ```
//!
//! Each `[factories."<type-id>"]` table becomes the init scope handed to the
//! mapper factory registered under that type id.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Scope returned for factories without a configuration table.
static EMPTY_SCOPE: BTreeMap<String, String> = BTreeMap::new();

/// Main configuration structure for the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Sync engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-factory init scopes, keyed by mapper type id.
    #[serde(default, deserialize_with = "scalar_tables")]
    pub factories: BTreeMap<String, BTreeMap<String, String>>,
}

/// Sync engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on enabled mappers per broker link.
    #[serde(default = "default_max_mappers")]
    pub max_mappers_per_link: usize,

    /// Whether two mappers sharing an ordinal abort the sync.
    ///
    /// When disabled, ties are broken by position in the link.
    #[serde(default = "default_reject_ties")]
    pub reject_ordinal_ties: bool,
}

const fn default_max_mappers() -> usize {
    64
}

const fn default_reject_ties() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_mappers_per_link: default_max_mappers(),
            reject_ordinal_ties: default_reject_ties(),
        }
    }
}

impl Config {
    /// Parses configuration from a TOML string.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::Config`] if the document is not valid configuration.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Returns the init scope for a factory type id.
    ///
    /// Factories without a table get an empty scope.
    #[must_use]
    pub fn factory_scope(&self, type_id: &str) -> &BTreeMap<String, String> {
        self.factories.get(type_id).unwrap_or(&EMPTY_SCOPE)
    }

    /// Sets a single factory scope value.
    #[must_use]
    pub fn with_factory_setting(
        mut self,
        type_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.factories
            .entry(type_id.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_mappers_per_link == 0 {
            return Err(Error::Config(
                "engine.max_mappers_per_link must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scalar accepted in a factory table; normalized to its string form.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScopeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ScopeValue {
    fn into_string(self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s,
        }
    }
}

fn scalar_tables<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, BTreeMap<String, ScopeValue>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(factory, table)| {
            let table = table
                .into_iter()
                .map(|(key, value)| (key, value.into_string()))
                .collect();
            (factory, table)
        })
        .collect())
}
