//! Capabilities mapper factories can request during `post_init`.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

/// Read access to the realm's roles.
///
/// Register as `Arc<dyn RoleCatalog>` in [`kc_spi::Capabilities`]; factories
/// that grant roles then reject configurations naming unknown roles.
pub trait RoleCatalog: Send + Sync + Debug {
    /// Checks whether a role exists.
    fn contains_role(&self, role: &str) -> bool;
}

/// Shared handle type under which the catalog is registered.
pub type SharedRoleCatalog = Arc<dyn RoleCatalog>;

/// Role catalog backed by a fixed set of names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticRoleCatalog {
    roles: BTreeSet<String>,
}

impl StaticRoleCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the catalog for registration as a capability.
    #[must_use]
    pub fn shared(self) -> SharedRoleCatalog {
        Arc::new(self)
    }
}

impl RoleCatalog for StaticRoleCatalog {
    fn contains_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

impl<S: Into<String>> FromIterator<S> for StaticRoleCatalog {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().map(Into::into).collect(),
        }
    }
}
