//! Mutation sets produced by mappers.
//!
//! Mappers never touch the user directly. Each returns a [`MutationSet`];
//! the engine concatenates them in ordinal order, resolves conflicts with
//! [`MutationSet::resolve`] and applies the result once.

use std::collections::BTreeMap;

use kc_model::LocalUserSnapshot;
use serde::{Deserialize, Serialize};

/// How a [`Mutation::SetAttribute`] combines with the current values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeMode {
    /// Overwrite the attribute.
    #[default]
    Replace,
    /// Add values not already present.
    Append,
    /// Overwrite, or remove the attribute when no values are given.
    RemoveIfAbsent,
}

/// One change to a local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Set the username.
    SetUsername {
        /// New username.
        username: String,
    },
    /// Set the email.
    SetEmail {
        /// New email.
        email: String,
    },
    /// Set the first name.
    SetFirstName {
        /// New first name.
        first_name: String,
    },
    /// Set the last name.
    SetLastName {
        /// New last name.
        last_name: String,
    },
    /// Change a custom attribute.
    SetAttribute {
        /// Attribute name.
        key: String,
        /// Values, in order.
        values: Vec<String>,
        /// How the values combine with the current ones.
        mode: AttributeMode,
    },
    /// Assign a role.
    GrantRole {
        /// Role name.
        role: String,
    },
    /// Unassign a role.
    RevokeRole {
        /// Role name.
        role: String,
    },
}

impl Mutation {
    /// Attribute key, for attribute mutations.
    #[must_use]
    pub fn attribute_key(&self) -> Option<&str> {
        match self {
            Self::SetAttribute { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Role name, for role mutations.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        match self {
            Self::GrantRole { role } | Self::RevokeRole { role } => Some(role),
            _ => None,
        }
    }
}

// ============================================================================
// Mutation Set
// ============================================================================

/// Ordered list of mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationSet {
    mutations: Vec<Mutation>,
}

impl MutationSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a mutation.
    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    /// Appends a username change.
    pub fn set_username(&mut self, username: impl Into<String>) -> &mut Self {
        self.push(Mutation::SetUsername {
            username: username.into(),
        })
    }

    /// Appends an email change.
    pub fn set_email(&mut self, email: impl Into<String>) -> &mut Self {
        self.push(Mutation::SetEmail {
            email: email.into(),
        })
    }

    /// Appends a first name change.
    pub fn set_first_name(&mut self, first_name: impl Into<String>) -> &mut Self {
        self.push(Mutation::SetFirstName {
            first_name: first_name.into(),
        })
    }

    /// Appends a last name change.
    pub fn set_last_name(&mut self, last_name: impl Into<String>) -> &mut Self {
        self.push(Mutation::SetLastName {
            last_name: last_name.into(),
        })
    }

    /// Appends an attribute change.
    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        values: Vec<String>,
        mode: AttributeMode,
    ) -> &mut Self {
        self.push(Mutation::SetAttribute {
            key: key.into(),
            values,
            mode,
        })
    }

    /// Appends a role grant.
    pub fn grant_role(&mut self, role: impl Into<String>) -> &mut Self {
        self.push(Mutation::GrantRole { role: role.into() })
    }

    /// Appends a role revocation.
    pub fn revoke_role(&mut self, role: impl Into<String>) -> &mut Self {
        self.push(Mutation::RevokeRole { role: role.into() })
    }

    /// Appends every mutation of another set.
    pub fn extend(&mut self, other: Self) {
        self.mutations.extend(other.mutations);
    }

    /// Iterates over the mutations in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Mutation> {
        self.mutations.iter()
    }

    /// Returns the number of mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Returns true if there are no mutations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Checks whether any mutation changes the attribute.
    #[must_use]
    pub fn touches_attribute(&self, key: &str) -> bool {
        self.iter().any(|m| m.attribute_key() == Some(key))
    }

    /// Checks whether any mutation sets the username.
    #[must_use]
    pub fn sets_username(&self) -> bool {
        self.iter().any(|m| matches!(m, Mutation::SetUsername { .. }))
    }

    /// Checks whether any mutation sets the email.
    #[must_use]
    pub fn sets_email(&self) -> bool {
        self.iter().any(|m| matches!(m, Mutation::SetEmail { .. }))
    }

    /// Checks whether any mutation sets the first name.
    #[must_use]
    pub fn sets_first_name(&self) -> bool {
        self.iter().any(|m| matches!(m, Mutation::SetFirstName { .. }))
    }

    /// Checks whether any mutation sets the last name.
    #[must_use]
    pub fn sets_last_name(&self) -> bool {
        self.iter().any(|m| matches!(m, Mutation::SetLastName { .. }))
    }

    /// Checks whether the role's last mutation is a grant.
    #[must_use]
    pub fn grants_role(&self, role: &str) -> bool {
        matches!(self.last_role_mutation(role), Some(Mutation::GrantRole { .. }))
    }

    /// Checks whether the role's last mutation is a revocation.
    #[must_use]
    pub fn revokes_role(&self, role: &str) -> bool {
        matches!(self.last_role_mutation(role), Some(Mutation::RevokeRole { .. }))
    }

    fn last_role_mutation(&self, role: &str) -> Option<&Mutation> {
        self.iter().rev().find(|m| m.role() == Some(role))
    }

    /// Folds the mutations into their net effect.
    ///
    /// - scalar fields: last write wins
    /// - `Replace` and `RemoveIfAbsent`: last write wins for the key
    /// - `Append`: adds to whatever is pending for the key
    /// - roles: the last grant or revoke of each role wins
    #[must_use]
    pub fn resolve(&self) -> ResolvedMutations {
        let mut resolved = ResolvedMutations::default();
        for mutation in self.iter() {
            resolved.fold(mutation);
        }
        resolved
    }
}

impl<'a> IntoIterator for &'a MutationSet {
    type Item = &'a Mutation;
    type IntoIter = std::slice::Iter<'a, Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.iter()
    }
}

impl IntoIterator for MutationSet {
    type Item = Mutation;
    type IntoIter = std::vec::IntoIter<Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.into_iter()
    }
}

impl FromIterator<Mutation> for MutationSet {
    fn from_iter<I: IntoIterator<Item = Mutation>>(iter: I) -> Self {
        Self {
            mutations: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Net change to one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeChange {
    /// Overwrite with these values; empty removes the attribute.
    Set(Vec<String>),
    /// Add values not already present.
    Append(Vec<String>),
    /// Remove the attribute.
    Remove,
}

/// Net change to one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    /// Assign the role.
    Grant,
    /// Unassign the role.
    Revoke,
}

/// Conflict-free form of a [`MutationSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMutations {
    /// Pending username.
    pub username: Option<String>,
    /// Pending email.
    pub email: Option<String>,
    /// Pending first name.
    pub first_name: Option<String>,
    /// Pending last name.
    pub last_name: Option<String>,
    /// Pending attribute changes by key.
    pub attributes: BTreeMap<String, AttributeChange>,
    /// Pending role changes by role.
    pub roles: BTreeMap<String, RoleChange>,
}

impl ResolvedMutations {
    fn fold(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::SetUsername { username } => self.username = Some(username.clone()),
            Mutation::SetEmail { email } => self.email = Some(email.clone()),
            Mutation::SetFirstName { first_name } => self.first_name = Some(first_name.clone()),
            Mutation::SetLastName { last_name } => self.last_name = Some(last_name.clone()),
            Mutation::SetAttribute { key, values, mode } => self.fold_attribute(key, values, *mode),
            Mutation::GrantRole { role } => {
                self.roles.insert(role.clone(), RoleChange::Grant);
            }
            Mutation::RevokeRole { role } => {
                self.roles.insert(role.clone(), RoleChange::Revoke);
            }
        }
    }

    fn fold_attribute(&mut self, key: &str, values: &[String], mode: AttributeMode) {
        let change = match mode {
            AttributeMode::Replace => AttributeChange::Set(values.to_vec()),
            AttributeMode::RemoveIfAbsent if values.is_empty() => AttributeChange::Remove,
            AttributeMode::RemoveIfAbsent => AttributeChange::Set(values.to_vec()),
            AttributeMode::Append => match self.attributes.remove(key) {
                Some(AttributeChange::Set(mut pending)) => {
                    push_unique(&mut pending, values);
                    AttributeChange::Set(pending)
                }
                Some(AttributeChange::Append(mut pending)) => {
                    push_unique(&mut pending, values);
                    AttributeChange::Append(pending)
                }
                Some(AttributeChange::Remove) => {
                    let mut fresh = Vec::new();
                    push_unique(&mut fresh, values);
                    AttributeChange::Set(fresh)
                }
                None => {
                    let mut fresh = Vec::new();
                    push_unique(&mut fresh, values);
                    AttributeChange::Append(fresh)
                }
            },
        };
        self.attributes.insert(key.to_string(), change);
    }

    /// Returns true if nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.attributes.is_empty()
            && self.roles.is_empty()
    }

    /// Applies the changes to a snapshot.
    ///
    /// Roles not named by any change keep their current assignment.
    #[must_use]
    pub fn apply(&self, mut user: LocalUserSnapshot) -> LocalUserSnapshot {
        if let Some(username) = &self.username {
            user.username.clone_from(username);
        }
        if let Some(email) = &self.email {
            user.email = Some(email.clone());
        }
        if let Some(first_name) = &self.first_name {
            user.first_name = Some(first_name.clone());
        }
        if let Some(last_name) = &self.last_name {
            user.last_name = Some(last_name.clone());
        }

        for (key, change) in &self.attributes {
            match change {
                AttributeChange::Set(values) if values.is_empty() => {
                    user.remove_attribute(key);
                }
                AttributeChange::Set(values) => user.set_attribute(key.clone(), values.clone()),
                AttributeChange::Append(values) => user.append_attribute(key.clone(), values),
                AttributeChange::Remove => {
                    user.remove_attribute(key);
                }
            }
        }

        for (role, change) in &self.roles {
            match change {
                RoleChange::Grant => {
                    user.roles.insert(role.clone());
                }
                RoleChange::Revoke => {
                    user.roles.remove(role);
                }
            }
        }

        user
    }

    /// Canonical mutation list with the same effect.
    ///
    /// Order: username, email, first name, last name, attributes by key,
    /// roles by name.
    #[must_use]
    pub fn to_mutation_set(&self) -> MutationSet {
        let mut set = MutationSet::new();
        if let Some(username) = &self.username {
            set.set_username(username.clone());
        }
        if let Some(email) = &self.email {
            set.set_email(email.clone());
        }
        if let Some(first_name) = &self.first_name {
            set.set_first_name(first_name.clone());
        }
        if let Some(last_name) = &self.last_name {
            set.set_last_name(last_name.clone());
        }
        for (key, change) in &self.attributes {
            let (values, mode) = match change {
                AttributeChange::Set(values) => (values.clone(), AttributeMode::Replace),
                AttributeChange::Append(values) => (values.clone(), AttributeMode::Append),
                AttributeChange::Remove => (Vec::new(), AttributeMode::RemoveIfAbsent),
            };
            set.set_attribute(key.clone(), values, mode);
        }
        for (role, change) in &self.roles {
            match change {
                RoleChange::Grant => set.grant_role(role.clone()),
                RoleChange::Revoke => set.revoke_role(role.clone()),
            };
        }
        set
    }
}

fn push_unique(target: &mut Vec<String>, values: &[String]) {
    for value in values {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}
