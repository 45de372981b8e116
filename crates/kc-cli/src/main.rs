//! # Keycloak broker CLI
//!
//! Offline tools for broker link mappers.

#![forbid(unsafe_code)]
#![allow(clippy::uninlined_format_args)]

use clap::Parser;
use kc_cli::{
    cli::{CatalogArgs, Cli, Command},
    commands::{build_engine, build_registry, run_describe, run_mappers, run_sync, run_validate},
    config::CliConfig,
    output::error,
    CliResult,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        error(&e.to_string());
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> CliResult<()> {
    let config = CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Mappers => {
            let registry = build_registry(&config, &CatalogArgs::default())?;
            run_mappers(&registry, cli.output)
        }
        Command::Describe { type_id } => {
            let registry = build_registry(&config, &CatalogArgs::default())?;
            run_describe(&registry, &type_id, cli.output)
        }
        Command::Validate(args) => {
            let engine = build_engine(&config, &args.catalog)?;
            run_validate(&args, &engine, cli.output)
        }
        Command::Sync(args) => {
            let engine = build_engine(&config, &args.catalog)?;
            run_sync(&args, &engine, cli.output, cli.verbose)
        }
    }
}
