//! External identity asserted by an identity provider.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// The normalized identity an external provider asserted for one login.
///
/// Built by the protocol layer after assertion validation; the broker only
/// reads it. Attribute and role collections are ordered so that mapping over
/// the same identity is reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Provider type (e.g. `"oidc"`, `"saml"`).
    pub provider_type: String,

    /// Subject identifier at the external provider.
    pub subject: String,

    /// Username asserted by the provider.
    pub username: String,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// First name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Last name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Claims and attributes, each one or many values.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,

    /// Roles and groups granted by the provider.
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl ExternalIdentity {
    /// Creates a new identity with no profile data.
    #[must_use]
    pub fn new(
        provider_type: impl Into<String>,
        subject: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            provider_type: provider_type.into(),
            subject: subject.into(),
            username: username.into(),
            email: None,
            first_name: None,
            last_name: None,
            attributes: BTreeMap::new(),
            roles: BTreeSet::new(),
        }
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the first name.
    #[must_use]
    pub fn with_first_name(mut self, name: impl Into<String>) -> Self {
        self.first_name = Some(name.into());
        self
    }

    /// Sets the last name.
    #[must_use]
    pub fn with_last_name(mut self, name: impl Into<String>) -> Self {
        self.last_name = Some(name.into());
        self
    }

    /// Sets a single-valued attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), vec![value.into()]);
        self
    }

    /// Sets a multi-valued attribute.
    #[must_use]
    pub fn with_attribute_values(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.attributes.insert(name.into(), values);
        self
    }

    /// Adds a granted external role or group.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Gets all values of an attribute.
    ///
    /// An attribute present with no values is reported as absent.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .get(name)
            .filter(|values| !values.is_empty())
            .map(Vec::as_slice)
    }

    /// Gets the first value of an attribute.
    #[must_use]
    pub fn first_attribute(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Checks whether the provider granted a role or group.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
