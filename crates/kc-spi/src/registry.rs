//! Registry for provider factories.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::capability::{Capabilities, RegistryHandle};
use crate::provider::{FactoryConfig, ProviderFactory, SpiError};

/// Lifecycle phase of a [`FactoryRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RegistryPhase {
    /// Accepting registrations; nothing can be resolved yet.
    Registering = 0,
    /// Frozen after `post_init`; factories can be resolved.
    Ready = 1,
    /// Shut down.
    Closed = 2,
}

impl RegistryPhase {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Registering,
            1 => Self::Ready,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for RegistryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Registering => "registering",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Registry of factories keyed by id.
///
/// Generic over the factory trait object, e.g.
/// `FactoryRegistry<dyn MapperFactory>`. Registration is append-only until
/// [`post_init`](Self::post_init) freezes the table; after that the table is
/// immutable and [`resolve`](Self::resolve) hands out shared references
/// after a single atomic phase load.
///
/// Lifecycle transitions (`register`, `post_init`, `close`) are serialized
/// by the staging lock. Lookups never take it once the registry is ready.
pub struct FactoryRegistry<F: ?Sized + ProviderFactory> {
    phase: AtomicU8,
    staged: Mutex<BTreeMap<String, Box<F>>>,
    frozen: OnceLock<BTreeMap<String, Arc<F>>>,
}

impl<F: ?Sized + ProviderFactory> Default for FactoryRegistry<F> {
    fn default() -> Self {
        Self {
            phase: AtomicU8::new(RegistryPhase::Registering as u8),
            staged: Mutex::new(BTreeMap::new()),
            frozen: OnceLock::new(),
        }
    }
}

impl<F: ?Sized + ProviderFactory> FactoryRegistry<F> {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> RegistryPhase {
        RegistryPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: RegistryPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Registers and initializes a factory.
    ///
    /// The factory's `init` runs immediately with `scope`. A factory whose
    /// `init` fails is closed and not registered.
    ///
    /// ## Errors
    ///
    /// - [`SpiError::RegistryFrozen`] after `post_init` or `close`
    /// - [`SpiError::DuplicateProvider`] if the id is already taken
    /// - [`SpiError::InitializationFailed`] if `init` fails
    pub fn register(&self, mut factory: Box<F>, scope: &dyn FactoryConfig) -> Result<(), SpiError> {
        let id = factory.id();
        let mut staged = self.staged.lock();
        if self.phase() != RegistryPhase::Registering {
            return Err(SpiError::RegistryFrozen(id.to_string()));
        }
        if staged.contains_key(id) {
            return Err(SpiError::DuplicateProvider(id.to_string()));
        }

        if let Err(err) = factory.init(scope) {
            tracing::warn!(provider = id, error = %err, "factory init failed");
            factory.close();
            return Err(as_init_failure(id, err));
        }

        tracing::debug!(provider = id, "factory registered");
        staged.insert(id.to_string(), factory);
        Ok(())
    }

    /// Runs every factory's `post_init` and freezes the registry.
    ///
    /// Factories are visited in id order. If any of them fails, every factory
    /// is closed and the registry moves to [`RegistryPhase::Closed`].
    ///
    /// ## Errors
    ///
    /// - [`SpiError::RegistryFrozen`] if already frozen
    /// - [`SpiError::NotReady`] if closed
    /// - [`SpiError::InitializationFailed`] if a factory's `post_init` fails
    pub fn post_init(&self, capabilities: &Capabilities) -> Result<(), SpiError> {
        let mut staged = self.staged.lock();
        match self.phase() {
            RegistryPhase::Registering => {}
            RegistryPhase::Ready => {
                return Err(SpiError::RegistryFrozen("post_init already completed".to_string()));
            }
            RegistryPhase::Closed => return Err(SpiError::NotReady(RegistryPhase::Closed)),
        }

        let mut pending = std::mem::take(&mut *staged);
        let ids: BTreeSet<String> = pending.keys().cloned().collect();
        let mut done: BTreeMap<String, Box<F>> = BTreeMap::new();

        for id in &ids {
            let Some(mut factory) = pending.remove(id) else {
                continue;
            };
            let handle = RegistryHandle::new(id, &ids, capabilities);
            if let Err(err) = factory.post_init(&handle) {
                tracing::warn!(provider = %id, error = %err, "factory post_init failed");
                factory.close();
                done.values().chain(pending.values()).for_each(|f| f.close());
                self.set_phase(RegistryPhase::Closed);
                return Err(as_init_failure(id, err));
            }
            done.insert(id.clone(), factory);
        }

        let table: BTreeMap<String, Arc<F>> = done
            .into_iter()
            .map(|(id, factory)| (id, Arc::from(factory)))
            .collect();
        if self.frozen.set(table).is_err() {
            return Err(SpiError::RegistryFrozen("post_init already completed".to_string()));
        }

        self.set_phase(RegistryPhase::Ready);
        tracing::info!(providers = ids.len(), "registry ready");
        Ok(())
    }

    /// Resolves a factory by id.
    ///
    /// ## Errors
    ///
    /// - [`SpiError::NotReady`] unless the registry is ready
    /// - [`SpiError::ProviderNotFound`] if no factory has this id
    pub fn resolve(&self, id: &str) -> Result<Arc<F>, SpiError> {
        let phase = self.phase();
        if phase != RegistryPhase::Ready {
            return Err(SpiError::NotReady(phase));
        }
        self.frozen
            .get()
            .and_then(|table| table.get(id))
            .cloned()
            .ok_or_else(|| SpiError::ProviderNotFound(id.to_string()))
    }

    /// Checks whether a factory id is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        match self.frozen.get() {
            Some(table) => table.contains_key(id),
            None => self.staged.lock().contains_key(id),
        }
    }

    /// Lists registered factory ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        match self.frozen.get() {
            Some(table) => table.keys().cloned().collect(),
            None => self.staged.lock().keys().cloned().collect(),
        }
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.frozen.get() {
            Some(table) => table.len(),
            None => self.staged.lock().len(),
        }
    }

    /// Returns true if no factory is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all factories in id order once the registry is ready.
    #[must_use]
    pub fn factories(&self) -> Vec<Arc<F>> {
        if self.phase() != RegistryPhase::Ready {
            return Vec::new();
        }
        self.frozen
            .get()
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Closes every factory. Safe to call more than once.
    pub fn close(&self) {
        let mut staged = self.staged.lock();
        if self.phase() == RegistryPhase::Closed {
            return;
        }
        self.set_phase(RegistryPhase::Closed);

        std::mem::take(&mut *staged).values().for_each(|f| f.close());
        if let Some(table) = self.frozen.get() {
            table.values().for_each(|f| f.close());
        }
        tracing::info!("registry closed");
    }
}

impl<F: ?Sized + ProviderFactory> Drop for FactoryRegistry<F> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<F: ?Sized + ProviderFactory> fmt::Debug for FactoryRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("phase", &self.phase())
            .field("ids", &self.ids())
            .finish()
    }
}

fn as_init_failure(id: &str, err: SpiError) -> SpiError {
    match err {
        err @ SpiError::InitializationFailed { .. } => err,
        other => SpiError::init_failed(id, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::provider::EmptyScope;

    type Journal = Arc<Mutex<Vec<String>>>;

    #[derive(Debug)]
    struct Recording {
        id: &'static str,
        journal: Journal,
        fail_init: bool,
        fail_post_init: bool,
        required_sibling: Option<&'static str>,
    }

    impl Recording {
        fn new(id: &'static str, journal: &Journal) -> Self {
            Self {
                id,
                journal: Arc::clone(journal),
                fail_init: false,
                fail_post_init: false,
                required_sibling: None,
            }
        }

        fn log(&self, step: &str) {
            self.journal.lock().push(format!("{}:{step}", self.id));
        }
    }

    impl ProviderFactory for Recording {
        fn id(&self) -> &'static str {
            self.id
        }

        fn init(&mut self, scope: &dyn FactoryConfig) -> Result<(), SpiError> {
            self.log("init");
            if self.fail_init || scope.get_bool("fail", false) {
                return Err(SpiError::Configuration("bad scope".to_string()));
            }
            Ok(())
        }

        fn post_init(&mut self, handle: &RegistryHandle<'_>) -> Result<(), SpiError> {
            self.log("post_init");
            if let Some(sibling) = self.required_sibling {
                if !handle.has_sibling(sibling) {
                    return Err(SpiError::ProviderNotFound(sibling.to_string()));
                }
            }
            if self.fail_post_init {
                return Err(SpiError::Configuration("post_init refused".to_string()));
            }
            Ok(())
        }

        fn close(&self) {
            self.log("close");
        }
    }

    fn registry() -> FactoryRegistry<dyn ProviderFactory> {
        FactoryRegistry::new()
    }

    #[test]
    fn registry_starts_empty() {
        let registry = registry();
        assert!(registry.is_empty());
        assert_eq!(registry.phase(), RegistryPhase::Registering);
    }

    #[test]
    fn resolve_before_post_init_is_not_ready() {
        let journal = Journal::default();
        let registry = registry();
        registry
            .register(Box::new(Recording::new("a", &journal)), &EmptyScope)
            .unwrap();

        assert!(registry.contains("a"));
        assert_eq!(
            registry.resolve("a").unwrap_err(),
            SpiError::NotReady(RegistryPhase::Registering)
        );
    }

    #[test]
    fn duplicate_registration_fails() {
        let journal = Journal::default();
        let registry = registry();
        registry
            .register(Box::new(Recording::new("a", &journal)), &EmptyScope)
            .unwrap();

        let err = registry
            .register(Box::new(Recording::new("a", &journal)), &EmptyScope)
            .unwrap_err();
        assert_eq!(err, SpiError::DuplicateProvider("a".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registration_after_post_init_is_frozen() {
        let journal = Journal::default();
        let registry = registry();
        registry.post_init(&Capabilities::new()).unwrap();

        let err = registry
            .register(Box::new(Recording::new("late", &journal)), &EmptyScope)
            .unwrap_err();
        assert_eq!(err, SpiError::RegistryFrozen("late".to_string()));
    }

    #[test]
    fn lifecycle_runs_each_hook_once() {
        let journal = Journal::default();
        let registry = registry();
        registry
            .register(Box::new(Recording::new("b", &journal)), &EmptyScope)
            .unwrap();
        registry
            .register(Box::new(Recording::new("a", &journal)), &EmptyScope)
            .unwrap();

        registry.post_init(&Capabilities::new()).unwrap();
        assert_eq!(registry.phase(), RegistryPhase::Ready);
        assert_eq!(registry.resolve("a").unwrap().id(), "a");
        assert_eq!(
            registry.resolve("zzz").unwrap_err(),
            SpiError::ProviderNotFound("zzz".to_string())
        );
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);

        registry.close();
        registry.close();

        assert_eq!(
            *journal.lock(),
            vec!["b:init", "a:init", "a:post_init", "b:post_init", "a:close", "b:close"]
        );
        assert_eq!(
            registry.resolve("a").unwrap_err(),
            SpiError::NotReady(RegistryPhase::Closed)
        );
    }

    #[test]
    fn failed_init_closes_factory_and_skips_it() {
        let journal = Journal::default();
        let registry = registry();
        let mut factory = Recording::new("broken", &journal);
        factory.fail_init = true;

        let err = registry.register(Box::new(factory), &EmptyScope).unwrap_err();

        assert_eq!(
            err,
            SpiError::init_failed("broken", "configuration error: bad scope")
        );
        assert!(!registry.contains("broken"));
        assert_eq!(*journal.lock(), vec!["broken:init", "broken:close"]);
    }

    #[test]
    fn init_reads_scope() {
        let journal = Journal::default();
        let registry = registry();
        let scope: BTreeMap<String, String> =
            [("fail".to_string(), "true".to_string())].into_iter().collect();

        assert!(registry
            .register(Box::new(Recording::new("a", &journal)), &scope)
            .is_err());
    }

    #[test]
    fn failed_post_init_closes_everything() {
        let journal = Journal::default();
        let registry = registry();
        let mut needy = Recording::new("needy", &journal);
        needy.required_sibling = Some("missing");
        registry
            .register(Box::new(Recording::new("alpha", &journal)), &EmptyScope)
            .unwrap();
        registry.register(Box::new(needy), &EmptyScope).unwrap();
        registry
            .register(Box::new(Recording::new("zeta", &journal)), &EmptyScope)
            .unwrap();

        let err = registry.post_init(&Capabilities::new()).unwrap_err();

        assert!(matches!(err, SpiError::InitializationFailed { ref id, .. } if id == "needy"));
        assert_eq!(registry.phase(), RegistryPhase::Closed);
        let journal = journal.lock();
        for id in ["alpha", "needy", "zeta"] {
            let closes = journal.iter().filter(|e| **e == format!("{id}:close")).count();
            assert_eq!(closes, 1, "{id} closed once");
        }
    }

    #[test]
    fn resolve_skips_the_staging_lock() {
        let journal = Journal::default();
        let registry = registry();
        registry
            .register(Box::new(Recording::new("a", &journal)), &EmptyScope)
            .unwrap();
        registry.post_init(&Capabilities::new()).unwrap();

        let _guard = registry.staged.lock();
        assert_eq!(registry.resolve("a").unwrap().id(), "a");
        assert_eq!(registry.phase(), RegistryPhase::Ready);
    }

    #[test]
    fn concurrent_resolves_after_post_init() {
        let journal = Journal::default();
        let registry = Arc::new(registry());
        for id in ["a", "b"] {
            registry
                .register(Box::new(Recording::new(id, &journal)), &EmptyScope)
                .unwrap();
        }
        registry.post_init(&Capabilities::new()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..100).all(|_| registry.resolve("a").is_ok() && registry.resolve("b").is_ok())
                })
            })
            .collect();
        assert!(handles.into_iter().all(|h| h.join().unwrap()));
    }

    #[test]
    fn post_init_twice_is_rejected() {
        let registry = registry();
        registry.post_init(&Capabilities::new()).unwrap();
        assert!(matches!(
            registry.post_init(&Capabilities::new()),
            Err(SpiError::RegistryFrozen(_))
        ));
    }
}
