//! Mapper type commands.

use kc_broker::registry::{self, MapperRegistry};
use kc_broker::{ConfigProperty, MapperDescriptor, PropertyValidator};
use serde::Serialize;
use tabled::Tabled;

use crate::config::OutputFormat;
use crate::output::{info, output, output_json, table};

/// Mapper type representation for display.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct MapperDisplay {
    /// Type id.
    #[tabled(rename = "Type")]
    pub type_id: String,
    /// Display name.
    #[tabled(rename = "Name")]
    pub name: String,
    /// Category.
    #[tabled(rename = "Category")]
    pub category: String,
    /// Number of configuration properties.
    #[tabled(rename = "Properties")]
    pub properties: usize,
}

impl From<&MapperDescriptor> for MapperDisplay {
    fn from(descriptor: &MapperDescriptor) -> Self {
        Self {
            type_id: descriptor.type_id.clone(),
            name: descriptor.display_name.clone(),
            category: descriptor.category.clone(),
            properties: descriptor.properties.len(),
        }
    }
}

/// Configuration property representation for display.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct PropertyDisplay {
    /// Property name.
    #[tabled(rename = "Property")]
    pub name: String,
    /// Value type.
    #[tabled(rename = "Type")]
    pub property_type: &'static str,
    /// Whether a value is required.
    #[tabled(rename = "Required")]
    pub required: bool,
    /// Default value, empty if none.
    #[tabled(rename = "Default")]
    pub default_value: String,
    /// Extra constraints.
    #[tabled(rename = "Constraints")]
    pub constraints: String,
}

impl From<&ConfigProperty> for PropertyDisplay {
    fn from(property: &ConfigProperty) -> Self {
        let constraints = property
            .validators
            .iter()
            .filter_map(|v| match v {
                PropertyValidator::Required => None,
                PropertyValidator::Range { min, max } => Some(format!("{min}..={max}")),
                PropertyValidator::OneOf { options } => Some(options.join(" | ")),
            })
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            name: property.name.clone(),
            property_type: property.property_type.as_str(),
            required: property.is_required(),
            default_value: property.default_value.clone().unwrap_or_default(),
            constraints,
        }
    }
}

/// Lists registered mapper types.
///
/// ## Errors
///
/// Returns an error if output fails.
pub fn run_mappers(registry: &MapperRegistry, format: OutputFormat) -> crate::CliResult<()> {
    let rows: Vec<MapperDisplay> = registry::describe_all(registry)
        .iter()
        .map(MapperDisplay::from)
        .collect();
    output(&rows, format)
}

/// Describes one mapper type.
///
/// ## Errors
///
/// Returns [`crate::CliError::NotFound`] if no factory has this type id.
pub fn run_describe(
    registry: &MapperRegistry,
    type_id: &str,
    format: OutputFormat,
) -> crate::CliResult<()> {
    let factory = registry.resolve(type_id).map_err(|e| match e {
        kc_spi::SpiError::ProviderNotFound(id) => crate::CliError::not_found("mapper type", id),
        other => other.into(),
    })?;
    let descriptor = factory.describe();

    match format {
        OutputFormat::Json => output_json(&descriptor),
        OutputFormat::Table => {
            println!("{} ({})", descriptor.display_name, descriptor.type_id);
            println!("Category: {}", descriptor.category);
            println!();
            println!("{}", descriptor.help_text);
            println!();
            if descriptor.properties.is_empty() {
                info("No configuration properties.");
            } else {
                let rows: Vec<PropertyDisplay> =
                    descriptor.properties.iter().map(PropertyDisplay::from).collect();
                println!("{}", table(&rows));
            }
            Ok(())
        }
    }
}
