//! Generic named-service container.

use crate::disposer::Disposer;
use crate::errors::RegistryError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type ServiceObject = Arc<dyn Any + Send + Sync>;

struct Slot {
    token: u64,
    service: ServiceObject,
}

#[derive(Default)]
struct Inner {
    slots: DashMap<String, Slot>,
    next_token: AtomicU64,
}

/// Maps service names to shared instances.
///
/// Lookups are typed: asking for the wrong type yields `None` rather than
/// a panic. Clones share the same services.
#[derive(Clone, Default)]
pub struct ServiceLocator {
    inner: Arc<Inner>,
}

impl ServiceLocator {
    /// Creates an empty locator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the name is taken.
    pub fn register<T: Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        service: Arc<T>,
    ) -> Result<Disposer, RegistryError> {
        let name = name.into();
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);

        match self.inner.slots.entry(name.clone()) {
            Entry::Occupied(_) => return Err(RegistryError::duplicate("Service", name)),
            Entry::Vacant(slot) => {
                slot.insert(Slot {
                    token,
                    service: service as ServiceObject,
                });
            }
        }
        tracing::debug!(service = %name, "Registered service");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(Disposer::new(format!("service:{name}"), move || {
            if let Some(inner) = weak.upgrade() {
                if inner.slots.remove_if(&name, |_, slot| slot.token == token).is_some() {
                    tracing::debug!(service = %name, "Unregistered service");
                }
            }
        }))
    }

    /// Returns the service registered under `name` if it has type `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let service = self.inner.slots.get(name)?.service.clone();
        service.downcast::<T>().ok()
    }

    /// Returns true if a service is registered under `name`.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.inner.slots.contains_key(name)
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.slots.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }
}

impl fmt::Debug for ServiceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLocator")
            .field("services", &self.names())
            .finish()
    }
}
