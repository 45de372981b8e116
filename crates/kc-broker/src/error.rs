//! Broker error types.
//!
//! ## NIST 800-53 Rev5: AU-3 (Content of Audit Records)
//!
//! Every [`SyncError`] carries a [`SyncLocation`] naming the broker link,
//! realm, provider alias and, when one is involved, the mapper id, type and
//! ordinal, so an aborted login can be traced to the exact configuration
//! entry.

use std::fmt;

use kc_core::event::{Event, EventType};
use kc_spi::SpiError;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Configuration errors
// ============================================================================

/// A mapper or link configuration value is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required property has no value.
    #[error("missing required property '{property}'")]
    MissingProperty {
        /// Property name.
        property: String,
    },

    /// A property value failed its validator.
    #[error("invalid value for property '{property}': {reason}")]
    InvalidProperty {
        /// Property name.
        property: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A sync mode label is not one of IMPORT, LEGACY, FORCE.
    #[error("unknown sync mode '{0}'")]
    UnknownSyncMode(String),
}

impl ConfigError {
    /// Creates a missing property error.
    #[must_use]
    pub fn missing(property: impl Into<String>) -> Self {
        Self::MissingProperty {
            property: property.into(),
        }
    }

    /// Creates an invalid property error.
    #[must_use]
    pub fn invalid(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProperty {
            property: property.into(),
            reason: reason.into(),
        }
    }

    /// Returns the offending property name, if any.
    #[must_use]
    pub fn property(&self) -> Option<&str> {
        match self {
            Self::MissingProperty { property } | Self::InvalidProperty { property, .. } => {
                Some(property)
            }
            Self::UnknownSyncMode(_) => None,
        }
    }
}

// ============================================================================
// Mapper execution errors
// ============================================================================

/// A bound mapper could not compute its mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapperError {
    /// A value the mapper needs is absent from the identity or user.
    #[error("no value for {0}")]
    MissingValue(String),

    /// A computed value is not acceptable.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field the value was computed for.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Any other mapper failure.
    #[error("{0}")]
    Other(String),
}

impl MapperError {
    /// Creates a missing value error.
    #[must_use]
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingValue(what.into())
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Sync errors
// ============================================================================

/// Identifies one mapper configuration entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperRef {
    /// Mapper configuration id.
    pub id: Uuid,
    /// Mapper type id.
    pub type_id: String,
    /// Ordinal within the link.
    pub ordinal: i32,
}

impl fmt::Display for MapperRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (ordinal {})", self.type_id, self.id, self.ordinal)
    }
}

/// Where a sync failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLocation {
    /// Broker link id.
    pub link_id: Uuid,
    /// Realm id.
    pub realm_id: Uuid,
    /// External provider alias.
    pub provider_alias: String,
    /// Mapper involved, if the failure is tied to one.
    pub mapper: Option<MapperRef>,
}

impl fmt::Display for SyncLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link {} ({})", self.link_id, self.provider_alias)?;
        if let Some(mapper) = &self.mapper {
            write!(f, ", mapper {mapper}")?;
        }
        Ok(())
    }
}

/// Fault that makes a link's configuration unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityFault {
    /// No factory is registered for the mapper type.
    #[error("unknown mapper type '{0}'")]
    UnknownMapperType(String),

    /// The registry refused the lookup.
    #[error(transparent)]
    Registry(SpiError),

    /// A mapper configuration failed validation.
    #[error("invalid mapper configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Two enabled mappers share an ordinal.
    #[error("ordinal {ordinal} is shared with mapper {other}")]
    OrdinalTie {
        /// The shared ordinal.
        ordinal: i32,
        /// The other mapper with this ordinal.
        other: Uuid,
    },

    /// The link has more enabled mappers than allowed.
    #[error("{count} enabled mappers exceed the limit of {max}")]
    TooManyMappers {
        /// Enabled mapper count.
        count: usize,
        /// Configured limit.
        max: usize,
    },
}

impl From<SpiError> for IntegrityFault {
    fn from(err: SpiError) -> Self {
        match err {
            SpiError::ProviderNotFound(type_id) => Self::UnknownMapperType(type_id),
            other => Self::Registry(other),
        }
    }
}

/// Errors that abort a brokered login sync.
///
/// Either way no mutation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The link's configuration cannot be used.
    #[error("configuration integrity error at {location}: {fault}")]
    ConfigurationIntegrity {
        /// Where the fault was found.
        location: SyncLocation,
        /// What is wrong.
        fault: IntegrityFault,
    },

    /// A mapper failed while computing mutations.
    #[error("mapper execution failed at {location}: {source}")]
    MapperExecution {
        /// Failing mapper.
        location: SyncLocation,
        /// Mapper failure.
        source: MapperError,
    },
}

impl SyncError {
    /// Creates a configuration integrity error.
    #[must_use]
    pub fn integrity(location: SyncLocation, fault: impl Into<IntegrityFault>) -> Self {
        Self::ConfigurationIntegrity {
            location,
            fault: fault.into(),
        }
    }

    /// Creates a mapper execution error.
    #[must_use]
    pub const fn execution(location: SyncLocation, source: MapperError) -> Self {
        Self::MapperExecution { location, source }
    }

    /// Checks if this is a configuration integrity error.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::ConfigurationIntegrity { .. })
    }

    /// Checks if this is a mapper execution error.
    #[must_use]
    pub const fn is_mapper_error(&self) -> bool {
        matches!(self, Self::MapperExecution { .. })
    }

    /// Returns where the error happened.
    #[must_use]
    pub const fn location(&self) -> &SyncLocation {
        match self {
            Self::ConfigurationIntegrity { location, .. } | Self::MapperExecution { location, .. } => {
                location
            }
        }
    }

    /// Builds the audit event recording the aborted login.
    #[must_use]
    pub fn audit_event(&self) -> Event {
        let location = self.location();
        let mut builder = Event::builder(EventType::IdentityProviderLoginError)
            .failure(self.to_string())
            .realm(location.realm_id)
            .identity_provider(location.provider_alias.clone())
            .detail("link_id", location.link_id.to_string());
        if let Some(mapper) = &location.mapper {
            builder = builder
                .detail("mapper_id", mapper.id.to_string())
                .detail("mapper_type", mapper.type_id.clone())
                .detail("ordinal", mapper.ordinal.to_string());
        }
        builder.build()
    }

    /// Returns the integrity fault, if this is a configuration error.
    #[must_use]
    pub const fn fault(&self) -> Option<&IntegrityFault> {
        match self {
            Self::ConfigurationIntegrity { fault, .. } => Some(fault),
            Self::MapperExecution { .. } => None,
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for mapper execution.
pub type MapperResult<T> = Result<T, MapperError>;
