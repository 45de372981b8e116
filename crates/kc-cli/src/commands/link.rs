//! Broker link commands.

use kc_broker::mutation::Mutation;
use kc_broker::{BrokerSyncEngine, MutationSet, Phase, SyncError};
use kc_core::Event;
use kc_model::{ExternalIdentity, LocalUserSnapshot};
use serde::Serialize;
use tabled::Tabled;

use super::{read_json, read_link};
use crate::cli::{SyncArgs, ValidateArgs};
use crate::config::OutputFormat;
use crate::output::{info, output, output_json, success, table, warning};

/// Bound mapper representation for display.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct BoundMapperDisplay {
    /// Ordinal within the link.
    #[tabled(rename = "Ordinal")]
    pub ordinal: i32,
    /// Mapper type id.
    #[tabled(rename = "Type")]
    pub type_id: String,
    /// Mapper configuration id.
    #[tabled(rename = "ID")]
    pub id: String,
}

/// Mutation representation for display.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct MutationDisplay {
    /// Operation.
    #[tabled(rename = "Operation")]
    pub op: String,
    /// Field, attribute or role.
    #[tabled(rename = "Target")]
    pub target: String,
    /// New value, empty for role changes.
    #[tabled(rename = "Value")]
    pub value: String,
}

impl From<&Mutation> for MutationDisplay {
    fn from(mutation: &Mutation) -> Self {
        let (op, target, value) = match mutation {
            Mutation::SetUsername { username } => ("set", "username".to_string(), username.clone()),
            Mutation::SetEmail { email } => ("set", "email".to_string(), email.clone()),
            Mutation::SetFirstName { first_name } => {
                ("set", "firstName".to_string(), first_name.clone())
            }
            Mutation::SetLastName { last_name } => {
                ("set", "lastName".to_string(), last_name.clone())
            }
            Mutation::SetAttribute { key, values, mode } => {
                let op = match mode {
                    kc_broker::AttributeMode::Replace if values.is_empty() => "remove",
                    kc_broker::AttributeMode::Replace => "set",
                    kc_broker::AttributeMode::Append => "append",
                    kc_broker::AttributeMode::RemoveIfAbsent => "remove",
                };
                (op, format!("attribute {key}"), values.join(", "))
            }
            Mutation::GrantRole { role } => ("grant", format!("role {role}"), String::new()),
            Mutation::RevokeRole { role } => ("revoke", format!("role {role}"), String::new()),
        };
        Self {
            op: op.to_string(),
            target,
            value,
        }
    }
}

/// JSON document printed by `sync`.
#[derive(Debug, Serialize)]
struct SyncOutput<'a> {
    phase: Phase,
    first_login: bool,
    mappers_run: usize,
    mutations: &'a MutationSet,
    user: &'a LocalUserSnapshot,
    event: &'a Event,
}

/// Validates a broker link definition.
///
/// ## Errors
///
/// Returns an error if the link cannot be read or a mapper cannot be bound.
pub fn run_validate(
    args: &ValidateArgs,
    engine: &BrokerSyncEngine,
    format: OutputFormat,
) -> crate::CliResult<()> {
    let link = read_link(&args.link)?;
    for disabled in link.mappers.iter().filter(|m| !m.enabled) {
        warning(&format!(
            "mapper '{}' ({}) is disabled and was not checked",
            disabled.name, disabled.mapper_type
        ));
    }

    let prepared = engine.prepare(&link)?;
    let rows: Vec<BoundMapperDisplay> = prepared
        .mappers()
        .map(|m| BoundMapperDisplay {
            ordinal: m.ordinal,
            type_id: m.type_id.clone(),
            id: m.id.to_string(),
        })
        .collect();

    output(&rows, format)?;
    if format == OutputFormat::Table {
        success(&format!(
            "Link '{}' is valid ({} mappers, {} mode)",
            link.provider_alias,
            rows.len(),
            link.sync_mode
        ));
    }
    Ok(())
}

/// Dry-runs a brokered login.
///
/// ## Errors
///
/// Returns an error if an input cannot be read or the sync aborts.
pub fn run_sync(
    args: &SyncArgs,
    engine: &BrokerSyncEngine,
    format: OutputFormat,
    verbose: bool,
) -> crate::CliResult<()> {
    let link = read_link(&args.link)?;
    let identity: ExternalIdentity = read_json(&args.identity)?;
    let existing: Option<LocalUserSnapshot> = args.user.as_deref().map(read_json).transpose()?;

    let report = engine
        .run(&identity, existing.as_ref(), &link)
        .map_err(|err| {
            if verbose {
                print_audit_event(&err);
            }
            err
        })?;

    match format {
        OutputFormat::Json => output_json(&SyncOutput {
            phase: report.phase,
            first_login: report.first_login,
            mappers_run: report.mappers_run,
            mutations: &report.mutations,
            user: &report.snapshot,
            event: &report.event,
        }),
        OutputFormat::Table => {
            info(&format!(
                "{} login, phase {}, {} mappers run",
                if report.first_login { "First" } else { "Subsequent" },
                report.phase,
                report.mappers_run
            ));
            if report.mutations.is_empty() {
                info("No changes.");
            } else {
                let rows: Vec<MutationDisplay> =
                    report.mutations.iter().map(MutationDisplay::from).collect();
                println!("{}", table(&rows));
            }
            println!();
            output_json(&report.snapshot)
        }
    }
}

fn print_audit_event(err: &SyncError) {
    if let Ok(json) = serde_json::to_string_pretty(&err.audit_event()) {
        eprintln!("{json}");
    }
}
