//! # kc-core
//!
//! Core configuration, error handling, and audit events for the Keycloak Rust
//! identity broker.
//!
//! This crate provides foundational types shared by the broker crates.
//!
//! ## NIST 800-53 Rev5 Controls
//!
//! - AU-2: Event logging framework
//! - SI-11: Error handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;

pub use config::{Config, EngineConfig};
pub use error::{Error, Result};
pub use event::{Event, EventOutcome, EventType};
