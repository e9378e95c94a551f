//! Mock stages for testing.

use crate::context::RequestContext;
use crate::core::RunStatus;
use crate::errors::{ErrorKind, StageError};
use crate::stages::{Next, Stage, StageResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Appends `<label>:in` before and `<label>:out` after the rest of the
/// chain to a shared trail.
#[derive(Debug, Clone)]
pub struct RecordingStage {
    label: String,
    trail: Arc<Mutex<Vec<String>>>,
}

impl RecordingStage {
    /// Creates a recording stage writing to `trail`.
    #[must_use]
    pub fn new(label: impl Into<String>, trail: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            label: label.into(),
            trail,
        }
    }
}

#[async_trait]
impl Stage for RecordingStage {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult {
        self.trail.lock().push(format!("{}:in", self.label));
        let status = next.run(ctx).await;
        self.trail.lock().push(format!("{}:out", self.label));
        status
    }
}

/// Counts invocations and remembers the configuration each one saw.
#[derive(Debug, Default)]
pub struct SpyStage {
    calls: Mutex<usize>,
    configs: Mutex<Vec<Option<Value>>>,
    prompts: Mutex<Vec<String>>,
}

impl SpyStage {
    /// Creates a spy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }

    /// Returns the stage configuration seen by each invocation.
    #[must_use]
    pub fn configs(&self) -> Vec<Option<Value>> {
        self.configs.lock().clone()
    }

    /// Returns the prompt seen by each invocation.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Stage for SpyStage {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult {
        *self.calls.lock() += 1;
        self.configs.lock().push(ctx.stage_config().cloned());
        self.prompts.lock().push(ctx.prompt.clone());
        next.run(ctx).await
    }
}

/// Ends the chain without calling the rest of it.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoppingStage;

#[async_trait]
impl Stage for StoppingStage {
    async fn execute(&self, _ctx: &mut RequestContext, _next: Next<'_>) -> StageResult {
        Ok(RunStatus::Stop)
    }
}

/// Fails with a fixed error.
#[derive(Debug, Clone)]
pub struct FailingStage {
    message: String,
    kind: Option<ErrorKind>,
}

impl FailingStage {
    /// Creates a stage failing with an unclassified error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    /// Creates a stage failing with a classified error.
    #[must_use]
    pub fn classified(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    async fn execute(&self, _ctx: &mut RequestContext, _next: Next<'_>) -> StageResult {
        Err(match self.kind {
            Some(kind) => StageError::classified(kind, self.message.clone()),
            None => StageError::new(self.message.clone()),
        })
    }
}
