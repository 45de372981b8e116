//! Mapper descriptors and property validation.
//!
//! A [`MapperDescriptor`] declares the configuration a mapper type accepts.
//! Stored [`MapperConfig`] values are checked against it once, when a mapper
//! is created, producing a [`ValidatedConfig`] with defaults applied.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

use crate::config::MapperConfig;
use crate::error::{ConfigError, ConfigResult};

/// Category for mappers that import attributes or profile fields.
pub const CATEGORY_ATTRIBUTE_IMPORTER: &str = "Attribute Importer";

/// Category for mappers that grant or revoke roles.
pub const CATEGORY_ROLE_IMPORTER: &str = "Role Importer";

/// Category for mappers that shape the local username.
pub const CATEGORY_PREPROCESSOR: &str = "Preprocessor";

// ============================================================================
// Properties
// ============================================================================

/// Value type of a configuration property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    /// Free text.
    String,
    /// `true` or `false`.
    Boolean,
    /// Signed integer.
    Integer,
    /// One of a fixed set of options.
    List,
    /// Name of a realm role.
    Role,
    /// Regular expression.
    Regex,
    /// `${...}` template.
    Template,
}

impl PropertyType {
    /// Returns the serialized name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::List => "LIST",
            Self::Role => "ROLE",
            Self::Regex => "REGEX",
            Self::Template => "TEMPLATE",
        }
    }
}

/// Constraint a property value must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyValidator {
    /// A value must be present.
    Required,
    /// Integer within `min..=max`.
    Range {
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },
    /// Value must be one of the options.
    OneOf {
        /// Accepted values.
        options: Vec<String>,
    },
}

/// One configurable property of a mapper type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigProperty {
    /// Key in [`MapperConfig::config`].
    pub name: String,
    /// Short label for admin tooling.
    pub label: String,
    /// Longer description.
    pub help_text: String,
    /// Value type.
    pub property_type: PropertyType,
    /// Value used when none is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Constraints on the value.
    pub validators: Vec<PropertyValidator>,
}

impl ConfigProperty {
    fn new(name: &str, label: &str, property_type: PropertyType) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            help_text: String::new(),
            property_type,
            default_value: None,
            validators: Vec::new(),
        }
    }

    /// Free text property.
    #[must_use]
    pub fn string(name: &str, label: &str) -> Self {
        Self::new(name, label, PropertyType::String)
    }

    /// Boolean property, `false` unless configured.
    #[must_use]
    pub fn boolean(name: &str, label: &str) -> Self {
        Self::new(name, label, PropertyType::Boolean).with_default("false")
    }

    /// Integer property bounded to `min..=max`.
    #[must_use]
    pub fn integer(name: &str, label: &str, min: i64, max: i64) -> Self {
        let mut property = Self::new(name, label, PropertyType::Integer);
        property.validators.push(PropertyValidator::Range { min, max });
        property
    }

    /// Property restricted to a fixed set of options.
    #[must_use]
    pub fn list(name: &str, label: &str, options: &[&str]) -> Self {
        let mut property = Self::new(name, label, PropertyType::List);
        property.validators.push(PropertyValidator::OneOf {
            options: options.iter().map(ToString::to_string).collect(),
        });
        property
    }

    /// Realm role name.
    #[must_use]
    pub fn role(name: &str, label: &str) -> Self {
        Self::new(name, label, PropertyType::Role)
    }

    /// Regular expression.
    #[must_use]
    pub fn regex(name: &str, label: &str) -> Self {
        Self::new(name, label, PropertyType::Regex)
    }

    /// `${...}` template.
    #[must_use]
    pub fn template(name: &str, label: &str) -> Self {
        Self::new(name, label, PropertyType::Template)
    }

    /// Sets the help text.
    #[must_use]
    pub fn with_help(mut self, help_text: &str) -> Self {
        self.help_text = help_text.to_string();
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, value: &str) -> Self {
        self.default_value = Some(value.to_string());
        self
    }

    /// Marks the property required.
    #[must_use]
    pub fn required(mut self) -> Self {
        if !self.is_required() {
            self.validators.insert(0, PropertyValidator::Required);
        }
        self
    }

    /// Checks whether a value must be present.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.validators.contains(&PropertyValidator::Required)
    }

    /// Checks a value against the property type and validators.
    ///
    /// Returns the normalized value.
    fn check(&self, raw: &str) -> ConfigResult<String> {
        let value = self.check_type(raw)?;
        for validator in &self.validators {
            match validator {
                PropertyValidator::Required => {}
                PropertyValidator::Range { min, max } => {
                    let n: i64 = value
                        .parse()
                        .map_err(|_| ConfigError::invalid(&self.name, "not an integer"))?;
                    if n < *min || n > *max {
                        return Err(ConfigError::invalid(
                            &self.name,
                            format!("{n} is outside {min}..={max}"),
                        ));
                    }
                }
                PropertyValidator::OneOf { options } => {
                    if !options.iter().any(|o| *o == value) {
                        return Err(ConfigError::invalid(
                            &self.name,
                            format!("'{value}' is not one of [{}]", options.join(", ")),
                        ));
                    }
                }
            }
        }
        Ok(value)
    }

    fn check_type(&self, raw: &str) -> ConfigResult<String> {
        match self.property_type {
            PropertyType::String | PropertyType::List => Ok(raw.to_string()),
            PropertyType::Role => Ok(raw.trim().to_string()),
            PropertyType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                value @ ("true" | "false") => Ok(value.to_string()),
                _ => Err(ConfigError::invalid(&self.name, "expected true or false")),
            },
            PropertyType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(|n| n.to_string())
                .map_err(|e| ConfigError::invalid(&self.name, e.to_string())),
            PropertyType::Regex => Regex::new(raw)
                .map(|_| raw.to_string())
                .map_err(|e| ConfigError::invalid(&self.name, e.to_string())),
            PropertyType::Template => {
                check_template_syntax(raw).map_err(|reason| ConfigError::invalid(&self.name, reason))?;
                Ok(raw.to_string())
            }
        }
    }
}

/// Checks that every `${` has a closing `}` with a non-empty name.
fn check_template_syntax(template: &str) -> Result<(), String> {
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(format!("unclosed placeholder at offset {}", template.len() - rest.len() + start));
        };
        if after[..end].trim().is_empty() {
            return Err("empty placeholder".to_string());
        }
        rest = &after[end + 1..];
    }
    Ok(())
}

// ============================================================================
// Descriptor
// ============================================================================

/// Immutable description of a mapper type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapperDescriptor {
    /// Type id the factory is registered under.
    pub type_id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Grouping for admin tooling.
    pub category: String,
    /// What the mapper does.
    pub help_text: String,
    /// Accepted properties.
    pub properties: Vec<ConfigProperty>,
}

impl MapperDescriptor {
    /// Creates a descriptor with no properties.
    #[must_use]
    pub fn new(type_id: &str, display_name: &str, category: &str, help_text: &str) -> Self {
        Self {
            type_id: type_id.to_string(),
            display_name: display_name.to_string(),
            category: category.to_string(),
            help_text: help_text.to_string(),
            properties: Vec::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, property: ConfigProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&ConfigProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Validates a stored configuration against the declared properties.
    ///
    /// Blank values count as absent. Defaults fill absent values; keys the
    /// descriptor does not declare are ignored.
    ///
    /// ## Errors
    ///
    /// Returns the first property that is missing or fails its validators.
    pub fn validate(&self, config: &MapperConfig) -> ConfigResult<ValidatedConfig> {
        let mut values = BTreeMap::new();

        for property in &self.properties {
            let configured = config
                .get(&property.name)
                .filter(|value| !value.trim().is_empty());
            let raw = match configured.or(property.default_value.as_deref()) {
                Some(raw) => raw,
                None if property.is_required() => {
                    return Err(ConfigError::missing(&property.name));
                }
                None => continue,
            };
            values.insert(property.name.clone(), property.check(raw)?);
        }

        for key in config.config.keys() {
            if self.property(key).is_none() {
                tracing::debug!(
                    mapper_type = %self.type_id,
                    property = %key,
                    "ignoring undeclared mapper property"
                );
            }
        }

        Ok(ValidatedConfig { values })
    }
}

// ============================================================================
// Validated configuration
// ============================================================================

/// Mapper configuration that passed its descriptor's validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedConfig {
    values: BTreeMap<String, String>,
}

impl ValidatedConfig {
    /// Gets a value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Gets a value that the descriptor marks required.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::MissingProperty`] if absent.
    pub fn require(&self, name: &str) -> ConfigResult<&str> {
        self.get(name).ok_or_else(|| ConfigError::missing(name))
    }

    /// Gets a boolean value; absent reads as `false`.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name) == Some("true")
    }

    /// Gets an integer value.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.parse().ok())
    }
}
