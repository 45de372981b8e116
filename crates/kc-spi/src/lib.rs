//! # kc-spi
//!
//! Service Provider Interface (SPI) plumbing for Keycloak Rust extensibility.
//!
//! Providers are contributed through factories that follow a fixed
//! lifecycle:
//!
//! 1. `init(scope)` - once, at registration, with the factory's own
//!    configuration scope
//! 2. `post_init(handle)` - once all factories are registered; the handle
//!    exposes sibling factory ids and shared [`Capabilities`]
//! 3. steady state - the registry is frozen and factories are resolved by id
//! 4. `close()` - at shutdown
//!
//! ## Design
//!
//! - [`ProviderFactory`] - lifecycle every factory implements
//! - [`FactoryRegistry`] - id-keyed registry generic over a factory trait
//! - [`Capabilities`] / [`RegistryHandle`] - what a factory may see during
//!   `post_init`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod capability;
pub mod provider;
pub mod registry;

pub use capability::{Capabilities, RegistryHandle};
pub use provider::{EmptyScope, FactoryConfig, ProviderFactory, SpiError};
pub use registry::{FactoryRegistry, RegistryPhase};
