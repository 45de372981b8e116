//! Builds the local username from a template.
//!
//! Placeholders are written `${NAME}` or `${NAME | transformer}`:
//!
//! | placeholder          | value                         |
//! |----------------------|-------------------------------|
//! | `ALIAS`              | provider alias of the link    |
//! | `SUBJECT`            | external subject id           |
//! | `USERNAME`           | username asserted by provider |
//! | `EMAIL`              | asserted email                |
//! | `FIRST_NAME`         | asserted first name           |
//! | `LAST_NAME`          | asserted last name            |
//! | `ATTRIBUTE.<name>`   | first value of an attribute   |
//!
//! Transformers: `lowercase`, `uppercase`.

use kc_spi::{FactoryConfig, ProviderFactory, RegistryHandle, SpiError};

use crate::config::MapperConfig;
use crate::descriptor::{ConfigProperty, MapperDescriptor, CATEGORY_PREPROCESSOR};
use crate::error::{ConfigError, MapperError, MapperResult};
use crate::mapper::{Mapper, MapperContext, MapperFactory};
use crate::mutation::MutationSet;

/// Type id.
pub const TYPE_ID: &str = "username-template";

/// Config key for the template.
pub const TEMPLATE: &str = "template";

/// Init scope key bounding the rendered username length.
pub const SCOPE_MAX_LENGTH: &str = "max-length";

const DEFAULT_TEMPLATE: &str = "${ALIAS}.${USERNAME}";

const DEFAULT_MAX_LENGTH: usize = 255;

/// Factory for [`UsernameTemplateMapper`].
#[derive(Debug)]
pub struct UsernameTemplateFactory {
    max_length: usize,
}

impl Default for UsernameTemplateFactory {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

impl ProviderFactory for UsernameTemplateFactory {
    fn id(&self) -> &'static str {
        TYPE_ID
    }

    fn init(&mut self, scope: &dyn FactoryConfig) -> Result<(), SpiError> {
        let Some(raw) = scope.get(SCOPE_MAX_LENGTH) else {
            return Ok(());
        };
        self.max_length = raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                SpiError::init_failed(
                    TYPE_ID,
                    format!("{SCOPE_MAX_LENGTH} must be a positive integer, got '{raw}'"),
                )
            })?;
        Ok(())
    }

    fn post_init(&mut self, _handle: &RegistryHandle<'_>) -> Result<(), SpiError> {
        Ok(())
    }

    fn close(&self) {}
}

impl MapperFactory for UsernameTemplateFactory {
    fn describe(&self) -> MapperDescriptor {
        MapperDescriptor::new(
            TYPE_ID,
            "Username Template Importer",
            CATEGORY_PREPROCESSOR,
            "Format the username to import.",
        )
        .with_property(
            ConfigProperty::template(TEMPLATE, "Template")
                .with_default(DEFAULT_TEMPLATE)
                .with_help(
                    "Template to use to format the username to import. Substitutions are \
                     enclosed in ${}, for example '${ALIAS}.${USERNAME}'. Append \
                     ' | lowercase' or ' | uppercase' to transform a substitution.",
                ),
        )
    }

    fn create(&self, config: &MapperConfig) -> Result<Box<dyn Mapper>, ConfigError> {
        let validated = self.describe().validate(config)?;
        let segments = parse_template(validated.require(TEMPLATE)?)?;
        Ok(Box::new(UsernameTemplateMapper {
            segments,
            max_length: self.max_length,
        }))
    }
}

// ============================================================================
// Template
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Alias,
    Subject,
    Username,
    Email,
    FirstName,
    LastName,
    Attribute(String),
}

impl Source {
    fn parse(name: &str) -> Option<Self> {
        let source = match name {
            "ALIAS" => Self::Alias,
            "SUBJECT" => Self::Subject,
            "USERNAME" => Self::Username,
            "EMAIL" => Self::Email,
            "FIRST_NAME" => Self::FirstName,
            "LAST_NAME" => Self::LastName,
            other => {
                let attribute = other.strip_prefix("ATTRIBUTE.")?;
                if attribute.is_empty() {
                    return None;
                }
                Self::Attribute(attribute.to_string())
            }
        };
        Some(source)
    }

    fn resolve<'a>(&self, ctx: &MapperContext<'a>) -> Option<&'a str> {
        let identity = ctx.identity;
        let value = match self {
            Self::Alias => Some(ctx.provider_alias),
            Self::Subject => Some(identity.subject.as_str()),
            Self::Username => Some(identity.username.as_str()),
            Self::Email => identity.email.as_deref(),
            Self::FirstName => identity.first_name.as_deref(),
            Self::LastName => identity.last_name.as_deref(),
            Self::Attribute(name) => identity.first_attribute(name),
        };
        value.filter(|value| !value.is_empty())
    }

    fn label(&self) -> String {
        match self {
            Self::Alias => "ALIAS".to_string(),
            Self::Subject => "SUBJECT".to_string(),
            Self::Username => "USERNAME".to_string(),
            Self::Email => "EMAIL".to_string(),
            Self::FirstName => "FIRST_NAME".to_string(),
            Self::LastName => "LAST_NAME".to_string(),
            Self::Attribute(name) => format!("ATTRIBUTE.{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transform {
    Lowercase,
    Uppercase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder {
        source: Source,
        transform: Option<Transform>,
    },
}

fn parse_template(template: &str) -> Result<Vec<Segment>, ConfigError> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::invalid(TEMPLATE, "unclosed placeholder"))?;
        segments.push(parse_placeholder(&after[..end])?);
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

fn parse_placeholder(body: &str) -> Result<Segment, ConfigError> {
    let mut parts = body.split('|').map(str::trim);
    let name = parts.next().unwrap_or_default();
    let source = Source::parse(name)
        .ok_or_else(|| ConfigError::invalid(TEMPLATE, format!("unknown placeholder '{name}'")))?;

    let transform = match parts.next() {
        None => None,
        Some("lowercase") => Some(Transform::Lowercase),
        Some("uppercase") => Some(Transform::Uppercase),
        Some(other) => {
            return Err(ConfigError::invalid(
                TEMPLATE,
                format!("unknown transformer '{other}'"),
            ));
        }
    };
    if parts.next().is_some() {
        return Err(ConfigError::invalid(
            TEMPLATE,
            format!("placeholder '{name}' has more than one transformer"),
        ));
    }

    Ok(Segment::Placeholder { source, transform })
}

/// Sets the username of imported users from a template.
#[derive(Debug, Clone)]
pub struct UsernameTemplateMapper {
    segments: Vec<Segment>,
    max_length: usize,
}

impl UsernameTemplateMapper {
    fn render(&self, ctx: &MapperContext<'_>) -> MapperResult<String> {
        let mut username = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => username.push_str(text),
                Segment::Placeholder { source, transform } => {
                    let value = source
                        .resolve(ctx)
                        .ok_or_else(|| MapperError::missing(source.label()))?;
                    match transform {
                        None => username.push_str(value),
                        Some(Transform::Lowercase) => username.push_str(&value.to_lowercase()),
                        Some(Transform::Uppercase) => username.push_str(&value.to_uppercase()),
                    }
                }
            }
        }

        if username.trim().is_empty() {
            return Err(MapperError::invalid("username", "template rendered an empty username"));
        }
        let length = username.chars().count();
        if length > self.max_length {
            return Err(MapperError::invalid(
                "username",
                format!("{length} characters exceed the limit of {}", self.max_length),
            ));
        }
        Ok(username)
    }
}

impl Mapper for UsernameTemplateMapper {
    fn import_attributes(&self, ctx: &MapperContext<'_>) -> MapperResult<MutationSet> {
        let mut set = MutationSet::new();
        set.set_username(self.render(ctx)?);
        Ok(set)
    }

    /// The username is chosen once, when the user is imported.
    fn update_attributes(
        &self,
        _ctx: &MapperContext<'_>,
        _previous: &MutationSet,
    ) -> MapperResult<MutationSet> {
        Ok(MutationSet::new())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kc_model::{ExternalIdentity, LocalUserSnapshot};
    use uuid::Uuid;

    use super::*;
    use crate::mappers::test_context;

    fn render(template: Option<&str>, identity: &ExternalIdentity) -> MapperResult<String> {
        let mut config = MapperConfig::new("m", TYPE_ID, 1);
        if let Some(template) = template {
            config = config.with_config(TEMPLATE, template);
        }
        let mapper = UsernameTemplateFactory::default().create(&config).unwrap();
        let user = LocalUserSnapshot::new(Uuid::nil(), "u");
        let set = mapper.import_attributes(&test_context(identity, &user))?;
        Ok(set.resolve().username.unwrap_or_default())
    }

    #[test]
    fn default_template_prefixes_alias() {
        let identity = ExternalIdentity::new("oidc", "s", "alice");
        assert_eq!(render(None, &identity).unwrap(), "corp.alice");
    }

    #[test]
    fn placeholders_and_transformers() {
        let identity = ExternalIdentity::new("oidc", "sub-9", "Alice")
            .with_email("Alice@Example.com")
            .with_attribute("dept", "Eng");

        assert_eq!(
            render(Some("${EMAIL | lowercase}"), &identity).unwrap(),
            "alice@example.com"
        );
        assert_eq!(
            render(Some("${ATTRIBUTE.dept|uppercase}-${SUBJECT}"), &identity).unwrap(),
            "ENG-sub-9"
        );
        assert_eq!(render(Some("static"), &identity).unwrap(), "static");
    }

    #[test]
    fn missing_value_is_mapper_error() {
        let identity = ExternalIdentity::new("oidc", "s", "alice");
        assert_eq!(
            render(Some("${EMAIL}"), &identity).unwrap_err(),
            MapperError::missing("EMAIL")
        );
    }

    #[test]
    fn invalid_templates_are_rejected_at_create() {
        for template in ["${NOPE}", "${USERNAME | reverse}", "${ATTRIBUTE.}", "${USERNAME", "${A|lowercase|uppercase}"] {
            let err = UsernameTemplateFactory::default()
                .create(&MapperConfig::new("m", TYPE_ID, 1).with_config(TEMPLATE, template))
                .unwrap_err();
            assert_eq!(err.property(), Some(TEMPLATE), "{template}");
        }
    }

    #[test]
    fn max_length_comes_from_init_scope() {
        let mut factory = UsernameTemplateFactory::default();
        let scope: BTreeMap<String, String> =
            [(SCOPE_MAX_LENGTH.to_string(), "5".to_string())].into_iter().collect();
        factory.init(&scope).unwrap();

        let mapper = factory
            .create(&MapperConfig::new("m", TYPE_ID, 1).with_config(TEMPLATE, "${USERNAME}"))
            .unwrap();
        let identity = ExternalIdentity::new("oidc", "s", "alexander");
        let user = LocalUserSnapshot::new(Uuid::nil(), "u");

        assert!(matches!(
            mapper.import_attributes(&test_context(&identity, &user)),
            Err(MapperError::InvalidValue { .. })
        ));
    }

    #[test]
    fn init_rejects_bad_max_length() {
        let mut factory = UsernameTemplateFactory::default();
        let scope: BTreeMap<String, String> =
            [(SCOPE_MAX_LENGTH.to_string(), "-1".to_string())].into_iter().collect();
        assert!(factory.init(&scope).is_err());
    }

    #[test]
    fn update_leaves_username_alone() {
        let mapper = UsernameTemplateFactory::default()
            .create(&MapperConfig::new("m", TYPE_ID, 1))
            .unwrap();
        let identity = ExternalIdentity::new("oidc", "s", "alice");
        let user = LocalUserSnapshot::new(Uuid::nil(), "corp.alice");

        assert!(mapper
            .update_attributes(&test_context(&identity, &user), &MutationSet::new())
            .unwrap()
            .is_empty());
    }
}
