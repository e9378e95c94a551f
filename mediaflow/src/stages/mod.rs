//! Stage trait, definitions, registry and execution order.
//!
//! Stages are the units of the onion chain. Each stage receives the
//! request context and a [`Next`] handle for the rest of the chain; work
//! done before awaiting `next.run(ctx)` happens on the way in, work done
//! after it happens on the way out.

mod chain;
mod definition;
mod graph;
mod registry;

pub use chain::Next;
pub(crate) use chain::ChainLink;
pub use definition::StageDefinition;
pub use graph::ExecutionGraph;
pub use registry::StageRegistry;

use crate::context::RequestContext;
use crate::core::RunStatus;
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt;

/// Result returned by every stage.
pub type StageResult = Result<RunStatus, StageError>;

/// One unit of the processing chain.
///
/// A stage either calls `next.run(ctx)` and propagates what it returns,
/// returns [`RunStatus::Stop`] without calling it, or returns an error,
/// which the engine turns into a failed request.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Executes the stage.
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult;
}

/// A stage built from a synchronous closure that runs before the rest of
/// the chain.
///
/// If the closure returns `Continue` the chain proceeds; `Stop` ends it.
pub struct FnStage<F>
where
    F: Fn(&mut RequestContext) -> StageResult + Send + Sync,
{
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&mut RequestContext) -> StageResult + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for FnStage<F>
where
    F: Fn(&mut RequestContext) -> StageResult + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&mut RequestContext) -> StageResult + Send + Sync,
{
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult {
        match (self.func)(ctx)? {
            RunStatus::Continue => next.run(ctx).await,
            RunStatus::Stop => Ok(RunStatus::Stop),
        }
    }
}

/// A stage that only passes control on.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStage;

#[async_trait]
impl Stage for NoOpStage {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult {
        next.run(ctx).await
    }
}
