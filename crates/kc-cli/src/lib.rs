//! # kc-cli
//!
//! Offline tools for Keycloak Rust broker links.
//!
//! The `kcb` binary works on files only, without a server:
//! - List and describe the registered mapper types
//! - Validate a broker link definition against the mapper registry
//! - Dry-run a brokered login and show the resulting user and mutations

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::uninlined_format_args)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::Cli;
pub use config::CliConfig;
pub use error::{CliError, CliResult};
