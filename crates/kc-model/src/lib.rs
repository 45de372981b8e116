//! # kc-model
//!
//! Domain models consumed and produced by the identity broker.
//!
//! - [`ExternalIdentity`] - the protocol-validated identity asserted by an
//!   external identity provider for one login
//! - [`LocalUserSnapshot`] - the broker-relevant state of a realm user

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod identity;
pub mod user;

pub use identity::ExternalIdentity;
pub use user::{FederatedIdentity, LocalUserSnapshot};
