//! Grants a role when an external attribute has a given value.

use std::sync::Arc;

use dashmap::DashMap;
use kc_spi::{FactoryConfig, ProviderFactory, RegistryHandle, SpiError};
use regex::{Regex, RegexBuilder};

use super::check_role;
use crate::capability::SharedRoleCatalog;
use crate::config::MapperConfig;
use crate::descriptor::{ConfigProperty, MapperDescriptor, CATEGORY_ROLE_IMPORTER};
use crate::error::{ConfigError, MapperResult};
use crate::mapper::{Mapper, MapperContext, MapperFactory};
use crate::mutation::MutationSet;

/// Type id.
pub const TYPE_ID: &str = "attribute-to-role";

/// Config key for the external attribute name.
pub const ATTRIBUTE: &str = "attribute";

/// Config key for the value to match.
pub const ATTRIBUTE_VALUE: &str = "attribute.value";

/// Config key selecting regex matching.
pub const ARE_VALUES_REGEX: &str = "are.attribute.values.regex";

/// Config key for the granted role.
pub const ROLE: &str = "role";

/// Init scope key bounding compiled regex size, in bytes.
pub const SCOPE_REGEX_SIZE_LIMIT: &str = "regex-size-limit";

const DEFAULT_REGEX_SIZE_LIMIT: i64 = 1 << 20;

/// Factory for [`AttributeToRoleMapper`].
///
/// Compiled patterns are shared between live mappers with the same value.
/// A pattern no mapper holds any more is dropped on the next cache miss.
#[derive(Debug)]
pub struct AttributeToRoleFactory {
    regex_size_limit: usize,
    catalog: Option<SharedRoleCatalog>,
    patterns: DashMap<String, Arc<Regex>>,
}

impl Default for AttributeToRoleFactory {
    fn default() -> Self {
        Self {
            regex_size_limit: usize::try_from(DEFAULT_REGEX_SIZE_LIMIT).unwrap_or(usize::MAX),
            catalog: None,
            patterns: DashMap::new(),
        }
    }
}

impl AttributeToRoleFactory {
    fn compile(&self, pattern: &str) -> Result<Arc<Regex>, ConfigError> {
        if let Some(regex) = self.patterns.get(pattern) {
            return Ok(Arc::clone(&regex));
        }
        self.patterns.retain(|_, regex| Arc::strong_count(regex) > 1);

        let regex = RegexBuilder::new(&format!("^(?:{pattern})$"))
            .size_limit(self.regex_size_limit)
            .build()
            .map_err(|e| ConfigError::invalid(ATTRIBUTE_VALUE, e.to_string()))?;
        let regex = Arc::new(regex);
        self.patterns.insert(pattern.to_string(), Arc::clone(&regex));
        Ok(regex)
    }
}

impl ProviderFactory for AttributeToRoleFactory {
    fn id(&self) -> &'static str {
        TYPE_ID
    }

    fn init(&mut self, scope: &dyn FactoryConfig) -> Result<(), SpiError> {
        let limit = scope.get_int(SCOPE_REGEX_SIZE_LIMIT, DEFAULT_REGEX_SIZE_LIMIT);
        self.regex_size_limit = usize::try_from(limit)
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or_else(|| {
                SpiError::init_failed(TYPE_ID, format!("{SCOPE_REGEX_SIZE_LIMIT} must be positive, got {limit}"))
            })?;
        Ok(())
    }

    fn post_init(&mut self, handle: &RegistryHandle<'_>) -> Result<(), SpiError> {
        self.catalog = handle.capability::<SharedRoleCatalog>().cloned();
        Ok(())
    }

    fn close(&self) {
        self.patterns.clear();
    }
}

impl MapperFactory for AttributeToRoleFactory {
    fn describe(&self) -> MapperDescriptor {
        MapperDescriptor::new(
            TYPE_ID,
            "Attribute to Role",
            CATEGORY_ROLE_IMPORTER,
            "If an attribute exists and has the configured value, grant the user the specified role.",
        )
        .with_property(
            ConfigProperty::string(ATTRIBUTE, "Attribute Name")
                .required()
                .with_help("Name of attribute to search for in the assertion."),
        )
        .with_property(
            ConfigProperty::string(ATTRIBUTE_VALUE, "Attribute Value")
                .required()
                .with_help("Value the attribute must have. If the attribute is multi-valued, any value may match."),
        )
        .with_property(
            ConfigProperty::boolean(ARE_VALUES_REGEX, "Regex Attribute Values")
                .with_help("Treat the attribute value as a regular expression matched against whole values."),
        )
        .with_property(
            ConfigProperty::role(ROLE, "Role")
                .required()
                .with_help("Role to grant to the user."),
        )
    }

    fn create(&self, config: &MapperConfig) -> Result<Box<dyn Mapper>, ConfigError> {
        let validated = self.describe().validate(config)?;
        let role = validated.require(ROLE)?;
        check_role(self.catalog.as_ref(), ROLE, role)?;

        let value = validated.require(ATTRIBUTE_VALUE)?;
        let matcher = if validated.get_bool(ARE_VALUES_REGEX) {
            ValueMatcher::Pattern(self.compile(value)?)
        } else {
            ValueMatcher::Exact(value.to_string())
        };

        Ok(Box::new(AttributeToRoleMapper {
            attribute: validated.require(ATTRIBUTE)?.to_string(),
            matcher,
            role: role.to_string(),
        }))
    }
}

#[derive(Debug, Clone)]
enum ValueMatcher {
    Exact(String),
    Pattern(Arc<Regex>),
}

impl ValueMatcher {
    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == value,
            Self::Pattern(regex) => regex.is_match(value),
        }
    }
}

/// Grants a role while an attribute matches.
#[derive(Debug, Clone)]
pub struct AttributeToRoleMapper {
    attribute: String,
    matcher: ValueMatcher,
    role: String,
}

impl AttributeToRoleMapper {
    fn applies(&self, ctx: &MapperContext<'_>) -> bool {
        ctx.identity
            .attribute(&self.attribute)
            .is_some_and(|values| values.iter().any(|v| self.matcher.matches(v)))
    }
}

impl Mapper for AttributeToRoleMapper {
    fn import_attributes(&self, ctx: &MapperContext<'_>) -> MapperResult<MutationSet> {
        let mut set = MutationSet::new();
        if self.applies(ctx) {
            set.grant_role(self.role.clone());
        }
        Ok(set)
    }

    fn update_attributes(
        &self,
        ctx: &MapperContext<'_>,
        _previous: &MutationSet,
    ) -> MapperResult<MutationSet> {
        let mut set = MutationSet::new();
        if self.applies(ctx) {
            set.grant_role(self.role.clone());
        } else {
            set.revoke_role(self.role.clone());
        }
        Ok(set)
    }
}
