//! Built-in mapper types.
//!
//! | type id                 | category           |
//! |-------------------------|--------------------|
//! | `attribute-importer`    | Attribute Importer |
//! | `hardcoded-attribute`   | Attribute Importer |
//! | `hardcoded-role`        | Role Importer      |
//! | `attribute-to-role`     | Role Importer      |
//! | `external-role-to-role` | Role Importer      |
//! | `username-template`     | Preprocessor       |

pub mod attribute_importer;
pub mod attribute_to_role;
pub mod external_role;
pub mod hardcoded_attribute;
pub mod hardcoded_role;
pub mod username_template;

pub use attribute_importer::AttributeImporterFactory;
pub use attribute_to_role::AttributeToRoleFactory;
pub use external_role::ExternalRoleToRoleFactory;
pub use hardcoded_attribute::HardcodedAttributeFactory;
pub use hardcoded_role::HardcodedRoleFactory;
pub use username_template::UsernameTemplateFactory;

use crate::capability::SharedRoleCatalog;
use crate::error::{ConfigError, ConfigResult};
use crate::mutation::{AttributeMode, MutationSet};

/// Target of an attribute-style mapper.
///
/// The names `username`, `email`, `firstName` and `lastName` address the
/// profile fields; any other name is a custom attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserField {
    /// The username.
    Username,
    /// The email.
    Email,
    /// The first name.
    FirstName,
    /// The last name.
    LastName,
    /// A custom attribute.
    Attribute(String),
}

impl UserField {
    /// Maps a configured name to its field.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "username" => Self::Username,
            "email" => Self::Email,
            "firstName" => Self::FirstName,
            "lastName" => Self::LastName,
            other => Self::Attribute(other.to_string()),
        }
    }

    /// Adds a mutation writing `values` to this field.
    ///
    /// Profile fields take the first value; an empty list leaves them alone.
    pub fn assign(&self, set: &mut MutationSet, values: &[String], mode: AttributeMode) {
        let first = values.first().cloned();
        match (self, first) {
            (Self::Attribute(key), _) => {
                set.set_attribute(key.clone(), values.to_vec(), mode);
            }
            (_, None) => {}
            (Self::Username, Some(value)) => {
                set.set_username(value);
            }
            (Self::Email, Some(value)) => {
                set.set_email(value);
            }
            (Self::FirstName, Some(value)) => {
                set.set_first_name(value);
            }
            (Self::LastName, Some(value)) => {
                set.set_last_name(value);
            }
        }
    }

    /// Checks whether a mutation set already writes this field.
    #[must_use]
    pub fn is_touched_by(&self, set: &MutationSet) -> bool {
        match self {
            Self::Username => set.sets_username(),
            Self::Email => set.sets_email(),
            Self::FirstName => set.sets_first_name(),
            Self::LastName => set.sets_last_name(),
            Self::Attribute(key) => set.touches_attribute(key),
        }
    }
}

/// Rejects a role the catalog does not know.
///
/// Without a catalog every role is accepted.
pub(crate) fn check_role(
    catalog: Option<&SharedRoleCatalog>,
    property: &str,
    role: &str,
) -> ConfigResult<()> {
    match catalog {
        Some(catalog) if !catalog.contains_role(role) => Err(ConfigError::invalid(
            property,
            format!("role '{role}' does not exist"),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) fn test_context<'a>(
    identity: &'a kc_model::ExternalIdentity,
    user: &'a kc_model::LocalUserSnapshot,
) -> crate::mapper::MapperContext<'a> {
    crate::mapper::MapperContext {
        identity,
        user,
        realm_id: user.realm_id,
        provider_alias: "corp",
        sync_mode: crate::config::SyncMode::Force,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::StaticRoleCatalog;

    #[test]
    fn parse_recognizes_profile_fields() {
        assert_eq!(UserField::parse("email"), UserField::Email);
        assert_eq!(UserField::parse("firstName"), UserField::FirstName);
        assert_eq!(
            UserField::parse("first_name"),
            UserField::Attribute("first_name".to_string())
        );
    }

    #[test]
    fn assign_uses_first_value_for_profile_fields() {
        let mut set = MutationSet::new();
        let values = vec!["a@example.com".to_string(), "b@example.com".to_string()];

        UserField::Email.assign(&mut set, &values, AttributeMode::Replace);
        UserField::LastName.assign(&mut set, &[], AttributeMode::Replace);

        assert_eq!(set.resolve().email.as_deref(), Some("a@example.com"));
        assert!(!set.sets_last_name());
        assert!(UserField::Email.is_touched_by(&set));
    }

    #[test]
    fn role_check_uses_catalog_when_present() {
        let catalog = ["admin"].into_iter().collect::<StaticRoleCatalog>().shared();

        assert!(check_role(Some(&catalog), "role", "admin").is_ok());
        assert_eq!(
            check_role(Some(&catalog), "role", "ghost").unwrap_err().property(),
            Some("role")
        );
        assert!(check_role(None, "role", "ghost").is_ok());
    }
}
