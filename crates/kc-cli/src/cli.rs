//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::OutputFormat;

/// Keycloak broker CLI - offline mapper administration and login dry runs.
#[derive(Debug, Parser)]
#[command(name = "kcb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Broker configuration file (defaults to ~/.keycloak/kcb.toml).
    #[arg(short, long, env = "KCB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List registered mapper types.
    Mappers,

    /// Show the configuration properties of a mapper type.
    Describe {
        /// Mapper type id.
        type_id: String,
    },

    /// Validate a broker link definition.
    Validate(ValidateArgs),

    /// Dry-run a brokered login.
    Sync(SyncArgs),
}

/// Role catalog options shared by commands that bind mappers.
#[derive(Debug, Clone, Default, Args)]
pub struct CatalogArgs {
    /// Realm role known to exist. When given, role mappers are checked
    /// against this list.
    #[arg(long = "role", value_name = "ROLE")]
    pub roles: Vec<String>,
}

/// Arguments for `validate`.
#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Broker link definition (TOML).
    #[arg(short, long)]
    pub link: PathBuf,

    /// Role catalog options.
    #[command(flatten)]
    pub catalog: CatalogArgs,
}

/// Arguments for `sync`.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Broker link definition (TOML).
    #[arg(short, long)]
    pub link: PathBuf,

    /// External identity (JSON).
    #[arg(short, long)]
    pub identity: PathBuf,

    /// Existing local user (JSON). Omit for a first login.
    #[arg(short, long)]
    pub user: Option<PathBuf>,

    /// Role catalog options.
    #[command(flatten)]
    pub catalog: CatalogArgs,
}
