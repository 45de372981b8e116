//! Shared capabilities handed to factories during `post_init`.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Type-keyed bag of shared services.
///
/// The root component builds this once and lends it to the registry; factories
/// pick what they need by type instead of holding references to each other.
#[derive(Default)]
pub struct Capabilities {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Capabilities {
    /// Creates an empty capability set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a capability, builder style.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Adds or replaces a capability.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Looks up a capability by type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Checks whether a capability is present.
    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no capability is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("count", &self.entries.len())
            .finish()
    }
}

/// View of the registry given to one factory during `post_init`.
#[derive(Debug, Clone, Copy)]
pub struct RegistryHandle<'a> {
    owner: &'a str,
    ids: &'a BTreeSet<String>,
    capabilities: &'a Capabilities,
}

impl<'a> RegistryHandle<'a> {
    /// Creates a handle for the factory registered as `owner`.
    #[must_use]
    pub const fn new(
        owner: &'a str,
        ids: &'a BTreeSet<String>,
        capabilities: &'a Capabilities,
    ) -> Self {
        Self {
            owner,
            ids,
            capabilities,
        }
    }

    /// Id of the factory receiving this handle.
    #[must_use]
    pub const fn owner(&self) -> &'a str {
        self.owner
    }

    /// Ids of every other registered factory, sorted.
    pub fn sibling_ids(&self) -> impl Iterator<Item = &'a str> + 'a {
        let owner = self.owner;
        self.ids
            .iter()
            .map(String::as_str)
            .filter(move |id| *id != owner)
    }

    /// Checks whether a sibling factory is registered.
    #[must_use]
    pub fn has_sibling(&self, id: &str) -> bool {
        id != self.owner && self.ids.contains(id)
    }

    /// Looks up a shared capability by type.
    #[must_use]
    pub fn capability<T: Any + Send + Sync>(&self) -> Option<&'a T> {
        self.capabilities.get::<T>()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> &'static str;
    }

    struct Hello;

    impl Greeter for Hello {
        fn greet(&self) -> &'static str {
            "hello"
        }
    }

    #[test]
    fn capabilities_are_keyed_by_type() {
        let caps = Capabilities::new()
            .with(42_u32)
            .with(Arc::new(Hello) as Arc<dyn Greeter>);

        assert_eq!(caps.len(), 2);
        assert_eq!(caps.get::<u32>(), Some(&42));
        assert!(caps.get::<u64>().is_none());
        assert_eq!(caps.get::<Arc<dyn Greeter>>().unwrap().greet(), "hello");
    }

    #[test]
    fn insert_replaces_same_type() {
        let mut caps = Capabilities::new();
        caps.insert("first".to_string());
        caps.insert("second".to_string());

        assert_eq!(caps.len(), 1);
        assert_eq!(caps.get::<String>().map(String::as_str), Some("second"));
    }

    #[test]
    fn handle_excludes_owner_from_siblings() {
        let ids: BTreeSet<String> = ["a", "b", "c"].iter().map(ToString::to_string).collect();
        let caps = Capabilities::new();
        let handle = RegistryHandle::new("b", &ids, &caps);

        assert_eq!(handle.owner(), "b");
        assert_eq!(handle.sibling_ids().collect::<Vec<_>>(), vec!["a", "c"]);
        assert!(handle.has_sibling("a"));
        assert!(!handle.has_sibling("b"));
        assert!(!handle.has_sibling("z"));
        assert!(handle.capability::<u32>().is_none());
    }
}
