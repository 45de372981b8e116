//! Local user snapshot.
//!
//! A snapshot is the broker-relevant subset of a realm user at one point in
//! time: profile fields, custom attributes, role assignments, and the links
//! to external identity providers. The user store owns the real record; the
//! broker reads a snapshot and returns a new one.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::ExternalIdentity;

/// A federated identity link (e.g., Google, GitHub login).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedIdentity {
    /// Identity provider alias (e.g., "google", "github").
    pub identity_provider: String,
    /// User ID at the identity provider.
    pub user_id: String,
    /// Username at the identity provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl FederatedIdentity {
    /// Creates a new federated identity.
    #[must_use]
    pub fn new(provider: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            identity_provider: provider.into(),
            user_id: user_id.into(),
            user_name: None,
        }
    }

    /// Sets the username at the provider.
    #[must_use]
    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }
}

/// State of a realm user before (or after) a brokered login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUserSnapshot {
    /// User ID; `None` until the user store persists a newly imported user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    /// Realm this user belongs to.
    pub realm_id: Uuid,

    /// Unique username within the realm.
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

    /// Custom attributes; value order is preserved.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,

    /// Assigned role names.
    #[serde(default)]
    pub roles: BTreeSet<String>,

    /// Linked external identities.
    #[serde(default)]
    pub federated_identities: Vec<FederatedIdentity>,
}

impl LocalUserSnapshot {
    /// Creates an empty snapshot with the given username.
    #[must_use]
    pub fn new(realm_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id: None,
            realm_id,
            username: username.into(),
            email: None,
            first_name: None,
            last_name: None,
            attributes: BTreeMap::new(),
            roles: BTreeSet::new(),
            federated_identities: Vec::new(),
        }
    }

    /// Seeds the snapshot of a user imported on first login.
    ///
    /// Only the username and email come from the external identity; every
    /// other field is left to the configured mappers.
    #[must_use]
    pub fn seed(realm_id: Uuid, provider_alias: &str, identity: &ExternalIdentity) -> Self {
        let mut user = Self::new(realm_id, identity.username.clone());
        user.email.clone_from(&identity.email);
        user.link_identity(
            FederatedIdentity::new(provider_alias, identity.subject.clone())
                .with_user_name(identity.username.clone()),
        );
        user
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

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.attributes.insert(name.into(), values);
        self
    }

    /// Adds a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Gets an attribute's values.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Gets the first value of an attribute.
    #[must_use]
    pub fn get_first_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Replaces an attribute's values.
    pub fn set_attribute(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.attributes.insert(name.into(), values);
    }

    /// Appends values not already present on an attribute.
    pub fn append_attribute(&mut self, name: impl Into<String>, values: &[String]) {
        let current = self.attributes.entry(name.into()).or_default();
        for value in values {
            if !current.contains(value) {
                current.push(value.clone());
            }
        }
    }

    /// Removes an attribute, returning its previous values.
    pub fn remove_attribute(&mut self, name: &str) -> Option<Vec<String>> {
        self.attributes.remove(name)
    }

    /// Checks whether the user holds a role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Links an external identity, replacing any link to the same provider.
    pub fn link_identity(&mut self, identity: FederatedIdentity) {
        self.federated_identities
            .retain(|fi| fi.identity_provider != identity.identity_provider);
        self.federated_identities.push(identity);
    }

    /// Finds a federated identity by provider alias.
    #[must_use]
    pub fn get_federated_identity(&self, provider: &str) -> Option<&FederatedIdentity> {
        self.federated_identities
            .iter()
            .find(|fi| fi.identity_provider == provider)
    }
}
