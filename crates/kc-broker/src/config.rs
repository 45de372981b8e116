//! Broker link and mapper configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

// ============================================================================
// Sync Mode
// ============================================================================

/// When mappers run for a broker link.
///
/// `Legacy` behaves like `Import` in the policy table; it stays a separate
/// value so stored configuration round-trips and mappers can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum SyncMode {
    /// Mappers run on first login only.
    #[default]
    Import,

    /// Pre-sync-mode behavior, kept for configuration compatibility.
    Legacy,

    /// Mappers run on every login.
    Force,
}

impl SyncMode {
    /// Returns the configuration label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "IMPORT",
            Self::Legacy => "LEGACY",
            Self::Force => "FORCE",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IMPORT" => Ok(Self::Import),
            "LEGACY" => Ok(Self::Legacy),
            "FORCE" => Ok(Self::Force),
            _ => Err(ConfigError::UnknownSyncMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for SyncMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Mapper Configuration
// ============================================================================

/// Stored configuration of one mapper on a broker link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Mapper ID.
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,

    /// Mapper name.
    pub name: String,

    /// Mapper type id, as registered by its factory.
    pub mapper_type: String,

    /// Position in the run order; lower runs first.
    pub ordinal: i32,

    /// Disabled mappers are skipped entirely.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,

    /// Mapper-specific property values.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

const fn enabled_by_default() -> bool {
    true
}

impl MapperConfig {
    /// Creates a new enabled mapper config.
    #[must_use]
    pub fn new(name: impl Into<String>, mapper_type: impl Into<String>, ordinal: i32) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            mapper_type: mapper_type.into(),
            ordinal,
            enabled: true,
            config: BTreeMap::new(),
        }
    }

    /// Adds a config value.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Marks the mapper disabled.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Gets a config value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}

// ============================================================================
// Broker Link
// ============================================================================

/// Binding between a realm and an external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerLink {
    /// Link ID.
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,

    /// Realm the link belongs to.
    pub realm_id: Uuid,

    /// External provider alias.
    pub provider_alias: String,

    /// Sync mode.
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Configured mappers.
    #[serde(default)]
    pub mappers: Vec<MapperConfig>,
}

impl BrokerLink {
    /// Creates a link with no mappers.
    #[must_use]
    pub fn new(realm_id: Uuid, provider_alias: impl Into<String>, sync_mode: SyncMode) -> Self {
        Self {
            id: Uuid::now_v7(),
            realm_id,
            provider_alias: provider_alias.into(),
            sync_mode,
            mappers: Vec::new(),
        }
    }

    /// Adds a mapper.
    #[must_use]
    pub fn with_mapper(mut self, mapper: MapperConfig) -> Self {
        self.mappers.push(mapper);
        self
    }

    /// Enabled mappers sorted by ordinal, ties in list order.
    #[must_use]
    pub fn enabled_mappers(&self) -> Vec<&MapperConfig> {
        let mut enabled: Vec<&MapperConfig> = self.mappers.iter().filter(|m| m.enabled).collect();
        enabled.sort_by_key(|m| m.ordinal);
        enabled
    }

    /// Finds the first pair of enabled mappers sharing an ordinal.
    #[must_use]
    pub fn find_ordinal_tie(&self) -> Option<(&MapperConfig, &MapperConfig)> {
        self.enabled_mappers()
            .windows(2)
            .find(|pair| pair[0].ordinal == pair[1].ordinal)
            .map(|pair| (pair[0], pair[1]))
    }

    /// Rewrites ordinals as dense ranks `1..=n`.
    ///
    /// Relative order is kept; mappers sharing an ordinal keep their list
    /// order. Disabled mappers are ranked too so enabling one later cannot
    /// introduce a tie.
    pub fn normalize_ordinals(&mut self) {
        let mut order: Vec<usize> = (0..self.mappers.len()).collect();
        order.sort_by_key(|&i| self.mappers[i].ordinal);
        for (rank, index) in (1..).zip(order) {
            self.mappers[index].ordinal = rank;
        }
    }
}
