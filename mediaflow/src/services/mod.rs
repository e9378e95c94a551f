//! Named services shared between plugins, and the host handle backends
//! receive.

mod locator;

pub use locator::ServiceLocator;

use std::sync::Arc;

/// What a backend sees of the host while generating.
#[derive(Debug, Clone, Default)]
pub struct HostHandle {
    services: ServiceLocator,
}

impl HostHandle {
    /// Creates a handle over `services`.
    #[must_use]
    pub fn new(services: ServiceLocator) -> Self {
        Self { services }
    }

    /// Returns the service locator.
    #[must_use]
    pub fn services(&self) -> &ServiceLocator {
        &self.services
    }

    /// Looks up a typed service.
    #[must_use]
    pub fn service<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.services.get::<T>(name)
    }
}
