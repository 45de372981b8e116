//! # kc-broker
//!
//! Identity-broker attribute mapping and synchronization.
//!
//! On every brokered login the external identity asserted by an identity
//! provider is translated into mutations on a local user. The link's
//! [`SyncMode`] decides whether mappers run at first login only or on every
//! login.
//!
//! ## Components
//!
//! - [`MapperDescriptor`] - typed description of a mapper's configuration
//! - [`MapperFactory`] / [`Mapper`] - create bound mappers and compute
//!   [`MutationSet`]s
//! - [`MapperRegistry`] - process-wide factories by type id
//! - [`SyncModePolicy`] - decides the phase for a login
//! - [`BrokerSyncEngine`] - runs mappers in ordinal order and applies the
//!   merged mutations
//!
//! ## Example
//!
//! ```
//! use kc_broker::{registry, BrokerLink, BrokerSyncEngine, MapperConfig, SyncMode};
//! use kc_core::Config;
//! use kc_model::ExternalIdentity;
//! use kc_spi::Capabilities;
//! use uuid::Uuid;
//!
//! let registry = registry::bootstrap(&Config::default(), &Capabilities::new()).unwrap();
//! let engine = BrokerSyncEngine::new(registry.into());
//!
//! let link = BrokerLink::new(Uuid::now_v7(), "corp", SyncMode::Force).with_mapper(
//!     MapperConfig::new("dept", "attribute-importer", 1)
//!         .with_config("attribute", "dept")
//!         .with_config("user.attribute", "department"),
//! );
//! let identity = ExternalIdentity::new("oidc", "sub-1", "alice").with_attribute("dept", "eng");
//!
//! let user = engine.sync(&identity, None, &link).unwrap();
//! assert_eq!(user.get_first_attribute("department"), Some("eng"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod capability;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod mappers;
pub mod mutation;
pub mod policy;
pub mod registry;

pub use capability::{RoleCatalog, StaticRoleCatalog};
pub use config::{BrokerLink, MapperConfig, SyncMode};
pub use descriptor::{ConfigProperty, MapperDescriptor, PropertyType, PropertyValidator, ValidatedConfig};
pub use engine::{BrokerSyncEngine, PreparedLink, SyncReport};
pub use error::{ConfigError, MapperError, SyncError, SyncResult};
pub use mapper::{Mapper, MapperContext, MapperFactory};
pub use mutation::{AttributeMode, Mutation, MutationSet, ResolvedMutations};
pub use policy::{Phase, SyncModePolicy};
pub use registry::MapperRegistry;
