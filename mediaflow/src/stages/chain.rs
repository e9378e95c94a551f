//! The continuation handed to each stage.

use super::{StageDefinition, StageResult};
use crate::context::RequestContext;
use crate::core::RunStatus;
use crate::events::names;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// A stage in a composed chain, together with the configuration resolved
/// for it when the chain was built.
#[derive(Debug, Clone)]
pub(crate) struct ChainLink {
    pub(crate) definition: Arc<StageDefinition>,
    pub(crate) config: Option<Value>,
}

/// The remainder of the chain after the current stage.
///
/// Consumed by [`Next::run`], so a stage can enter the rest of the chain
/// at most once:
///
/// ```compile_fail
/// use async_trait::async_trait;
/// use mediaflow::prelude::*;
///
/// struct Twice;
///
/// #[async_trait]
/// impl Stage for Twice {
///     async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult {
///         next.run(ctx).await?;
///         next.run(ctx).await
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Next<'a> {
    links: &'a [ChainLink],
}

impl<'a> Next<'a> {
    pub(crate) fn new(links: &'a [ChainLink]) -> Self {
        Self { links }
    }

    /// A continuation with nothing left to run.
    #[must_use]
    pub fn end() -> Next<'static> {
        Next { links: &[] }
    }

    /// Returns the number of stages left in the chain.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.links.len()
    }

    /// Returns the names of the stages left in the chain.
    #[must_use]
    pub fn remaining_names(&self) -> Vec<&str> {
        self.links.iter().map(|l| l.definition.name()).collect()
    }

    /// Runs the rest of the chain and returns its status.
    ///
    /// An exhausted chain returns `Continue`.
    pub fn run<'c>(self, ctx: &'c mut RequestContext) -> BoxFuture<'c, StageResult>
    where
        'a: 'c,
    {
        Box::pin(async move {
            let Some((link, rest)) = self.links.split_first() else {
                return Ok(RunStatus::Continue);
            };

            let name = link.definition.name();
            let previous = ctx.enter_stage(name, link.config.clone());
            ctx.emit(
                names::STAGE_STARTED,
                Some(json!({ "stage": name, "phase": link.definition.phase() })),
            );

            let started = Instant::now();
            let result = link
                .definition
                .stage()
                .execute(ctx, Next::new(rest))
                .await
                .map_err(|mut err| {
                    err.stage.get_or_insert_with(|| name.to_string());
                    err
                });
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            match &result {
                Ok(status) => ctx.emit(
                    names::STAGE_COMPLETED,
                    Some(json!({ "stage": name, "status": status, "duration_ms": duration_ms })),
                ),
                Err(err) => ctx.emit(
                    names::STAGE_FAILED,
                    Some(json!({ "stage": name, "error": err.message, "duration_ms": duration_ms })),
                ),
            }

            ctx.leave_stage(previous);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Phase;
    use crate::errors::StageError;
    use crate::stages::{FnStage, Stage};
    use crate::testing::SpyStage;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Wrap(&'static str);

    #[async_trait]
    impl Stage for Wrap {
        async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult {
            ctx.prompt.push_str(&format!(" >{}", self.0));
            let status = next.run(ctx).await?;
            ctx.prompt.push_str(&format!(" <{}", self.0));
            Ok(status)
        }
    }

    fn link(name: &str, stage: impl Stage + 'static) -> ChainLink {
        ChainLink {
            definition: Arc::new(StageDefinition::new(name, Phase::Prepare, stage)),
            config: None,
        }
    }

    #[tokio::test]
    async fn test_onion_order() {
        let links = vec![link("a", Wrap("a")), link("b", Wrap("b"))];
        let mut ctx = RequestContext::new("start");

        let status = Next::new(&links).run(&mut ctx).await.unwrap();

        assert_eq!(status, RunStatus::Continue);
        assert_eq!(ctx.prompt, "start >a >b <b <a");
    }

    #[tokio::test]
    async fn test_stop_skips_rest() {
        let links = vec![
            link("gate", FnStage::new(|_ctx: &mut RequestContext| Ok(RunStatus::Stop))),
            link("after", Wrap("after")),
        ];
        let mut ctx = RequestContext::new("p");

        let status = Next::new(&links).run(&mut ctx).await.unwrap();

        assert_eq!(status, RunStatus::Stop);
        assert_eq!(ctx.prompt, "p");
    }

    #[tokio::test]
    async fn test_config_visible_to_its_stage_only() {
        let mut links = vec![
            link("outer", FnStage::new(|ctx: &mut RequestContext| {
                let value = ctx.stage_config().cloned().unwrap_or(Value::Null);
                ctx.data.insert("outer".to_string(), value);
                Ok(RunStatus::Continue)
            })),
            link("inner", FnStage::new(|ctx: &mut RequestContext| {
                let value = ctx.stage_config().cloned().unwrap_or(Value::Null);
                ctx.data.insert("inner".to_string(), value);
                Ok(RunStatus::Continue)
            })),
        ];
        links[0].config = Some(json!({"limit": 3}));
        let mut ctx = RequestContext::new("p");

        Next::new(&links).run(&mut ctx).await.unwrap();

        assert_eq!(ctx.data["outer"], json!({"limit": 3}));
        assert_eq!(ctx.data["inner"], Value::Null);
        assert_eq!(ctx.current_stage(), None);
    }

    #[tokio::test]
    async fn test_each_downstream_stage_runs_once() {
        let spy = Arc::new(SpyStage::new());
        let links = vec![
            link("a", Wrap("a")),
            link("b", Wrap("b")),
            ChainLink {
                definition: Arc::new(StageDefinition::from_arc("spy", Phase::Request, spy.clone())),
                config: None,
            },
        ];
        let mut ctx = RequestContext::new("p");

        Next::new(&links).run(&mut ctx).await.unwrap();

        assert_eq!(spy.calls(), 1);
        assert_eq!(ctx.prompt, "p >a >b <b <a");
    }

    #[tokio::test]
    async fn test_error_names_the_stage_that_raised_it() {
        let links = vec![
            link("outer", Wrap("outer")),
            link("billing", FnStage::new(|_ctx: &mut RequestContext| {
                Err(StageError::new("no credit"))
            })),
        ];
        let mut ctx = RequestContext::new("p");

        let err = Next::new(&links).run(&mut ctx).await.unwrap_err();

        assert_eq!(err.stage.as_deref(), Some("billing"));
        assert_eq!(ctx.current_stage(), None);
    }

    #[test]
    fn test_remaining_names() {
        let links = vec![link("a", Wrap("a")), link("b", Wrap("b"))];
        let next = Next::new(&links);
        assert_eq!(next.remaining(), 2);
        assert_eq!(next.remaining_names(), vec!["a", "b"]);
        assert_eq!(Next::end().remaining(), 0);
    }
}
