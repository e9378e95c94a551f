//! The built-in stage that calls the channel's backend.

use crate::backends::{BackendCall, BackendInvocationService, InvocationOptions};
use crate::config::InvocationSettings;
use crate::context::{LogLevel, RequestContext};
use crate::core::{Phase, RunStatus};
use crate::errors::ErrorKind;
use crate::stages::{Next, Stage, StageDefinition, StageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Name under which the request stage is registered.
pub const REQUEST_STAGE: &str = "request";

/// Invokes the backend named by the channel's connector.
///
/// The stage config may set `timeout_ms` and `retries`; anything unset
/// falls back to the engine-wide [`InvocationSettings`]. On success the
/// output is stored on the context and the chain continues. On failure
/// the classified error is set and the chain stops.
#[derive(Debug, Clone)]
pub struct RequestStage {
    invoker: BackendInvocationService,
    defaults: InvocationSettings,
}

impl RequestStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(invoker: BackendInvocationService, defaults: InvocationSettings) -> Self {
        Self { invoker, defaults }
    }

    /// Wraps the stage in its definition for registration.
    #[must_use]
    pub fn into_definition(self) -> StageDefinition {
        StageDefinition::new(REQUEST_STAGE, Phase::Request, self)
    }

    fn options(&self, config: Option<&Value>) -> InvocationOptions {
        let mut options = self.defaults.options();
        if let Some(timeout_ms) = config.and_then(|c| c.get("timeout_ms")).and_then(Value::as_u64) {
            options.timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(retries) = config
            .and_then(|c| c.get("retries"))
            .and_then(Value::as_u64)
            .and_then(|r| u32::try_from(r).ok())
        {
            options.retries = retries;
        }
        options
    }

    fn fail(ctx: &mut RequestContext, kind: ErrorKind, message: String) -> StageResult {
        ctx.log(LogLevel::Error, message.clone());
        ctx.set_error_with_kind(kind, message);
        Ok(RunStatus::Stop)
    }
}

#[async_trait]
impl Stage for RequestStage {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult {
        let resolved = ctx.channel().map(|channel| {
            (
                channel.connector_id.clone(),
                channel.name.clone(),
                channel.connector_config.clone(),
            )
        });
        let Some((backend_id, channel_name, config)) = resolved else {
            return Self::fail(ctx, ErrorKind::ConfigInvalid, "No channel resolved".to_string());
        };

        if backend_id.is_empty() {
            return Self::fail(
                ctx,
                ErrorKind::ConfigInvalid,
                format!("Channel '{channel_name}' has no connector"),
            );
        }

        let options = self.options(ctx.stage_config());
        ctx.notify_prepare_complete();

        let call = BackendCall {
            config,
            files: ctx.files.clone(),
            prompt: ctx.prompt.clone(),
            parameters: ctx.parameters.clone(),
        };
        ctx.log_info(format!("Invoking backend '{backend_id}'"));
        let outcome = self.invoker.execute(&backend_id, call, &options).await;

        ctx.request_log = outcome.request_log.clone();
        ctx.response_log = outcome.response_log.clone();

        match outcome.classified_error() {
            None => {
                let output = outcome.output.unwrap_or_default();
                ctx.log_info(format!(
                    "Backend '{backend_id}' returned {} artifact(s) after {} attempt(s)",
                    output.len(),
                    outcome.attempts
                ));
                ctx.output = Some(output);
                next.run(ctx).await
            }
            Some(err) => Self::fail(ctx, err.kind, err.message),
        }
    }
}
