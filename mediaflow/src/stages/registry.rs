//! Registry of stages contributed by plugins.

use super::graph::{build_graph, order_phase};
use super::{ExecutionGraph, StageDefinition};
use crate::disposer::Disposer;
use crate::errors::{CycleDetectedError, RegistryError};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

#[derive(Debug)]
struct Registered {
    token: u64,
    definition: Arc<StageDefinition>,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Registration order.
    entries: Vec<Registered>,
    next_token: u64,
    /// Last successfully built graph.
    graph: Option<Arc<ExecutionGraph>>,
    dirty: bool,
    last_error: Option<CycleDetectedError>,
}

impl RegistryState {
    fn definitions(&self) -> Vec<Arc<StageDefinition>> {
        self.entries.iter().map(|e| e.definition.clone()).collect()
    }

    fn rebuild(&mut self) {
        match build_graph(&self.definitions()) {
            Ok(graph) => {
                tracing::debug!(stages = graph.len(), "Rebuilt stage graph");
                self.graph = Some(Arc::new(graph));
                self.last_error = None;
            }
            Err(err) => {
                tracing::error!(error = %err, "Stage graph rebuild failed, keeping last good graph");
                self.last_error = Some(err);
            }
        }
        self.dirty = false;
    }
}

/// Holds the registered stages and the execution order derived from them.
///
/// Mutations invalidate the cached graph; it is rebuilt on the next read.
/// Cloning the registry yields another handle to the same stages.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stage.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken, if the stage hints against itself, or if
    /// its hints close a cycle among the stages of its phase.
    pub fn register(&self, definition: StageDefinition) -> Result<Disposer, RegistryError> {
        definition.validate()?;
        let definition = Arc::new(definition);
        let name = definition.name().to_string();

        let mut state = self.state.write();
        if state.entries.iter().any(|e| e.definition.name() == name) {
            return Err(RegistryError::duplicate("Stage", name));
        }

        let phase = definition.phase();
        let mut members: Vec<Arc<StageDefinition>> = state
            .entries
            .iter()
            .filter(|e| e.definition.phase() == phase)
            .map(|e| e.definition.clone())
            .collect();
        members.push(definition.clone());
        order_phase(phase, &members)?;

        let token = state.next_token;
        state.next_token += 1;
        state.entries.push(Registered { token, definition });
        state.dirty = true;
        drop(state);

        tracing::info!(stage = %name, %phase, "Registered stage");

        let weak: Weak<RwLock<RegistryState>> = Arc::downgrade(&self.state);
        let label = format!("stage:{name}");
        Ok(Disposer::new(label, move || {
            if let Some(state) = weak.upgrade() {
                let mut state = state.write();
                let before = state.entries.len();
                state.entries.retain(|e| e.token != token);
                if state.entries.len() != before {
                    state.dirty = true;
                    tracing::info!(stage = %name, "Unregistered stage");
                }
            }
        }))
    }

    /// Returns a stage by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<StageDefinition>> {
        self.state
            .read()
            .entries
            .iter()
            .find(|e| e.definition.name() == name)
            .map(|e| e.definition.clone())
    }

    /// Returns true if a stage with this name is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.state
            .read()
            .entries
            .iter()
            .any(|e| e.definition.name() == name)
    }

    /// Returns the registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.state
            .read()
            .entries
            .iter()
            .map(|e| e.definition.name().to_string())
            .collect()
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if no stages are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Returns the execution graph, rebuilding it if the registry changed.
    ///
    /// If the rebuild fails the last good graph is returned and the error
    /// is kept for [`StageRegistry::last_build_error`].
    #[must_use]
    pub fn graph(&self) -> Arc<ExecutionGraph> {
        {
            let state = self.state.read();
            if !state.dirty {
                if let Some(ref graph) = state.graph {
                    return graph.clone();
                }
            }
        }

        let mut state = self.state.write();
        if state.dirty || (state.graph.is_none() && state.last_error.is_none()) {
            state.rebuild();
        }
        state
            .graph
            .clone()
            .unwrap_or_else(|| Arc::new(ExecutionGraph::empty()))
    }

    /// Like [`StageRegistry::graph`], but reports a failed rebuild.
    ///
    /// # Errors
    ///
    /// Returns the build error of the most recent rebuild, if it failed.
    pub fn try_graph(&self) -> Result<Arc<ExecutionGraph>, CycleDetectedError> {
        let graph = self.graph();
        match self.state.read().last_error {
            Some(ref err) => Err(err.clone()),
            None => Ok(graph),
        }
    }

    /// Returns the error of the most recent rebuild, if it failed.
    #[must_use]
    pub fn last_build_error(&self) -> Option<CycleDetectedError> {
        self.state.read().last_error.clone()
    }

    #[cfg(test)]
    fn insert_unchecked(&self, definition: StageDefinition) {
        let mut state = self.state.write();
        let token = state.next_token;
        state.next_token += 1;
        state.entries.push(Registered {
            token,
            definition: Arc::new(definition),
        });
        state.dirty = true;
    }
}
