//! Registry of generation backends keyed by id.

use super::Backend;
use crate::disposer::Disposer;
use crate::errors::RegistryError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

struct Slot {
    token: u64,
    backend: Arc<dyn Backend>,
}

#[derive(Default)]
struct Slots {
    by_id: HashMap<String, Slot>,
    next_token: u64,
}

/// Keyed store of backends. Clones share the same backends.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    slots: Arc<RwLock<Slots>>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend under its id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the id is taken.
    pub fn register(&self, backend: Arc<dyn Backend>) -> Result<Disposer, RegistryError> {
        let id = backend.id().to_string();
        let mut slots = self.slots.write();
        if slots.by_id.contains_key(&id) {
            return Err(RegistryError::duplicate("Backend", id));
        }

        let token = slots.next_token;
        slots.next_token += 1;
        let kinds: Vec<String> = backend.supported_kinds().iter().map(ToString::to_string).collect();
        slots.by_id.insert(id.clone(), Slot { token, backend });
        drop(slots);

        tracing::info!(backend = %id, kinds = ?kinds, "Registered backend");

        let weak: Weak<RwLock<Slots>> = Arc::downgrade(&self.slots);
        Ok(Disposer::new(format!("backend:{id}"), move || {
            let Some(slots) = weak.upgrade() else {
                return;
            };
            let mut slots = slots.write();
            if slots.by_id.get(&id).is_some_and(|slot| slot.token == token) {
                slots.by_id.remove(&id);
                tracing::info!(backend = %id, "Unregistered backend");
            }
        }))
    }

    /// Returns a backend by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Backend>> {
        self.slots.read().by_id.get(id).map(|slot| slot.backend.clone())
    }

    /// Returns true if a backend with this id is registered.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.slots.read().by_id.contains_key(id)
    }

    /// Returns the registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots.read().by_id.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of registered backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().by_id.len()
    }

    /// Returns true if no backends are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().by_id.is_empty()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::EchoBackend;

    #[test]
    fn test_register_get_has() {
        let registry = BackendRegistry::new();
        let _d = registry.register(Arc::new(EchoBackend::new("echo"))).unwrap();

        assert!(registry.has("echo"));
        assert_eq!(registry.get("echo").unwrap().id(), "echo");
        assert!(registry.get("dalle").is_none());
        assert_eq!(registry.ids(), vec!["echo"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = BackendRegistry::new();
        let _d = registry.register(Arc::new(EchoBackend::new("echo"))).unwrap();

        let err = registry
            .register(Arc::new(EchoBackend::new("echo")))
            .unwrap_err();
        assert_eq!(err.to_string(), "Backend 'echo' is already registered");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_dispose_removes_backend() {
        let registry = BackendRegistry::new();
        let disposer = registry.register(Arc::new(EchoBackend::new("echo"))).unwrap();
        assert_eq!(disposer.label(), "backend:echo");

        disposer.dispose();
        assert!(!registry.has("echo"));
        assert!(registry.is_empty());

        let _again = registry.register(Arc::new(EchoBackend::new("echo"))).unwrap();
        assert!(registry.has("echo"));
    }
}
