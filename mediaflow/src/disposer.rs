//! Handles that undo a registration.

use std::fmt;

type DisposeFn = Box<dyn FnOnce() + Send + Sync>;

/// Undoes one registration when [`Disposer::dispose`] is called.
///
/// Dropping a disposer without calling `dispose` leaves the registration
/// in place; plugins keep their disposers and call them at unload.
#[must_use = "dropping a Disposer keeps the registration alive forever"]
pub struct Disposer {
    label: String,
    action: Option<DisposeFn>,
}

impl Disposer {
    /// Creates a disposer from a closure.
    pub fn new(label: impl Into<String>, action: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            action: Some(Box::new(action)),
        }
    }

    /// Returns what this disposer removes, e.g. `stage:billing`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Removes the registration.
    pub fn dispose(mut self) {
        if let Some(action) = self.action.take() {
            tracing::debug!(registration = %self.label, "Disposing registration");
            action();
        }
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("label", &self.label)
            .field("pending", &self.action.is_some())
            .finish()
    }
}

/// Collects disposers so a plugin can undo all of its registrations at once.
#[derive(Debug, Default)]
pub struct DisposerSet {
    disposers: Vec<Disposer>,
}

impl DisposerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a disposer.
    pub fn push(&mut self, disposer: Disposer) {
        self.disposers.push(disposer);
    }

    /// Returns the number of held disposers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.disposers.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.disposers.is_empty()
    }

    /// Disposes everything in reverse registration order.
    pub fn dispose_all(&mut self) {
        while let Some(disposer) = self.disposers.pop() {
            disposer.dispose();
        }
    }
}
