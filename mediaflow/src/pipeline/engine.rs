//! The onion-model pipeline engine.

use super::{GenerationRequest, GenerationResult};
use crate::config::EngineConfig;
use crate::context::{LogLevel, RequestContext};
use crate::errors::{ClassifiedError, ErrorKind};
use crate::events::{names, EventSink, NoOpEventSink};
use crate::host::{
    resolve_stage_config, AllPluginsEnabled, Channel, ChannelResolver, PluginStatus,
    ScopedEnablement, StageConfigSource, StageEnablement,
};
use crate::stages::{ChainLink, ExecutionGraph, Next, StageRegistry};
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Runs generation requests through the registered stages.
///
/// Each request gets a fresh [`RequestContext`]. Enabled stages run in
/// graph order as an onion: every stage wraps the rest of the chain.
/// `execute` never returns an error; every outcome is a
/// [`GenerationResult`]. Panics raised by stages, the channel resolver
/// or the enablement predicate are caught and reported as failures.
/// Event sinks must not panic.
#[derive(Clone)]
pub struct PipelineEngine {
    stages: StageRegistry,
    channels: Arc<dyn ChannelResolver>,
    enablement: Arc<dyn StageEnablement>,
    configs: Arc<dyn StageConfigSource>,
    events: Arc<dyn EventSink>,
}

impl PipelineEngine {
    /// Starts building an engine over `stages`, resolving channels with
    /// `channels`.
    #[must_use]
    pub fn builder(
        stages: StageRegistry,
        channels: Arc<dyn ChannelResolver>,
    ) -> PipelineEngineBuilder {
        PipelineEngineBuilder {
            stages,
            channels,
            enablement: None,
            configs: None,
            config: None,
            plugins: None,
            events: None,
        }
    }

    /// Returns the stage registry.
    #[must_use]
    pub fn stages(&self) -> &StageRegistry {
        &self.stages
    }

    /// Executes one generation request.
    pub async fn execute(&self, request: GenerationRequest) -> GenerationResult {
        let started = Instant::now();
        let GenerationRequest {
            channel: channel_ref,
            prompt,
            files,
            parameters,
            session,
            uid,
            on_prepare_complete,
        } = request;

        let mut ctx = RequestContext::new(prompt)
            .with_files(files)
            .with_parameters(parameters)
            .with_caller(session, uid)
            .with_prepare_callback(on_prepare_complete)
            .with_event_sink(self.events.clone());

        let resolved = AssertUnwindSafe(self.channels.get_channel(&channel_ref))
            .catch_unwind()
            .await;
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(payload) => {
                let message = format!("Channel resolver panicked: {}", panic_message(&*payload));
                tracing::error!(request_id = %ctx.request_id(), channel = %channel_ref, "Channel resolver panicked");
                return Self::finish_early(&ctx, ClassifiedError::new(ErrorKind::Unknown, message), started);
            }
        };
        let Some(channel) = resolved else {
            tracing::warn!(request_id = %ctx.request_id(), channel = %channel_ref, "Channel not found");
            let err = ClassifiedError::new(
                ErrorKind::NotFound,
                format!("Channel '{channel_ref}' not found"),
            );
            return Self::finish_early(&ctx, err, started);
        };

        if !channel.enabled {
            tracing::warn!(request_id = %ctx.request_id(), channel = %channel.name, "Channel is disabled");
            let err = ClassifiedError::new(
                ErrorKind::Disabled,
                format!("Channel '{}' is disabled", channel.name),
            );
            return Self::finish_early(&ctx, err, started);
        }

        ctx = ctx.with_channel(channel.clone());
        let graph = self.stages.graph();
        let composed = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.compose(&graph, &ctx, &channel)
        }));
        let links = match composed {
            Ok(links) => links,
            Err(payload) => {
                let message = format!("Stage enablement panicked: {}", panic_message(&*payload));
                tracing::error!(request_id = %ctx.request_id(), channel = %channel.name, "Stage enablement panicked");
                return Self::finish_early(&ctx, ClassifiedError::new(ErrorKind::Unknown, message), started);
            }
        };

        ctx.emit(
            names::PIPELINE_STARTED,
            Some(json!({ "stages": links.iter().map(|l| l.definition.name()).collect::<Vec<_>>() })),
        );
        tracing::debug!(
            request_id = %ctx.request_id(),
            channel = %channel.name,
            stages = links.len(),
            skipped = graph.len() - links.len(),
            "Executing pipeline"
        );

        let outcome = AssertUnwindSafe(Next::new(&links).run(&mut ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                ctx.log_for(err.stage.as_deref(), LogLevel::Error, err.message.clone());
                match err.kind {
                    Some(kind) => ctx.set_error_with_kind(kind, err.message),
                    None => ctx.set_error(err.message),
                }
            }
            Err(payload) => {
                // Unwinding skips the frame restores, so the frame still
                // names the stage that panicked.
                let stage = ctx.current_stage().map(str::to_string);
                let label = stage.as_deref().unwrap_or("unknown");
                let message = format!("Stage '{label}' panicked: {}", panic_message(&*payload));
                tracing::error!(request_id = %ctx.request_id(), stage = %label, "Stage panicked");
                ctx.leave_stage(Default::default());
                ctx.log_for(stage.as_deref(), LogLevel::Error, message.clone());
                ctx.set_error(message);
            }
        }

        let result = Self::collect(&mut ctx, started);
        if result.success {
            ctx.emit(
                names::PIPELINE_COMPLETED,
                Some(json!({
                    "duration_ms": result.duration.as_secs_f64() * 1000.0,
                    "artifacts": result.output.as_ref().map_or(0, Vec::len),
                })),
            );
            tracing::info!(
                request_id = %result.request_id,
                channel = %channel.name,
                duration_ms = result.duration.as_millis() as u64,
                "Pipeline completed"
            );
        } else {
            ctx.emit(
                names::PIPELINE_FAILED,
                Some(json!({ "error": result.error, "error_code": result.error_code })),
            );
            tracing::warn!(
                request_id = %result.request_id,
                channel = %channel.name,
                error = result.error.as_deref().unwrap_or_default(),
                error_code = result.error_code,
                "Pipeline failed"
            );
        }
        result
    }

    fn compose(
        &self,
        graph: &ExecutionGraph,
        ctx: &RequestContext,
        channel: &Channel,
    ) -> Vec<ChainLink> {
        graph
            .stages()
            .iter()
            .filter_map(|definition| {
                if !self.enablement.is_stage_enabled(definition, channel) {
                    tracing::debug!(stage = definition.name(), channel = %channel.name, "Stage disabled");
                    ctx.emit(
                        names::STAGE_SKIPPED,
                        Some(json!({ "stage": definition.name(), "reason": "disabled" })),
                    );
                    return None;
                }
                Some(ChainLink {
                    definition: definition.clone(),
                    config: resolve_stage_config(self.configs.as_ref(), definition),
                })
            })
            .collect()
    }

    fn collect(ctx: &mut RequestContext, started: Instant) -> GenerationResult {
        let duration = started.elapsed();
        let mut result = match ctx.error() {
            Some(message) => GenerationResult::failure(
                ctx.request_id(),
                ClassifiedError::new(
                    ctx.error_kind().unwrap_or(ErrorKind::Unknown),
                    message,
                ),
                duration,
            ),
            None => GenerationResult::success(
                ctx.request_id(),
                ctx.output.take().unwrap_or_default(),
                duration,
            ),
        };
        result.task_id = ctx.task_id.clone();
        result.hints = ctx.hints.clone();
        result.logs = ctx.take_logs().into_entries();
        result
    }

    fn finish_early(
        ctx: &RequestContext,
        err: ClassifiedError,
        started: Instant,
    ) -> GenerationResult {
        ctx.emit(
            names::PIPELINE_FAILED,
            Some(json!({ "error": err.message, "error_code": err.code() })),
        );
        GenerationResult::failure(ctx.request_id(), err, started.elapsed())
    }
}

impl fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("stages", &self.stages.names())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for [`PipelineEngine`].
///
/// Unless an enablement predicate is given explicitly, stages are
/// enabled by [`ScopedEnablement`] over the plugin status and engine
/// configuration (each defaulting to "everything enabled").
pub struct PipelineEngineBuilder {
    stages: StageRegistry,
    channels: Arc<dyn ChannelResolver>,
    enablement: Option<Arc<dyn StageEnablement>>,
    configs: Option<Arc<dyn StageConfigSource>>,
    config: Option<Arc<EngineConfig>>,
    plugins: Option<Arc<dyn PluginStatus>>,
    events: Option<Arc<dyn EventSink>>,
}

impl PipelineEngineBuilder {
    /// Uses `config` for global stage enablement and stage configuration.
    #[must_use]
    pub fn config(mut self, config: Arc<EngineConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the plugin status used by the default enablement predicate.
    #[must_use]
    pub fn plugins(mut self, plugins: Arc<dyn PluginStatus>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// Replaces the enablement predicate.
    #[must_use]
    pub fn enablement(mut self, enablement: Arc<dyn StageEnablement>) -> Self {
        self.enablement = Some(enablement);
        self
    }

    /// Replaces the stage configuration source.
    #[must_use]
    pub fn configs(mut self, configs: Arc<dyn StageConfigSource>) -> Self {
        self.configs = Some(configs);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> PipelineEngine {
        let config = self.config.unwrap_or_default();
        let enablement = self.enablement.unwrap_or_else(|| {
            let plugins = self
                .plugins
                .unwrap_or_else(|| Arc::new(AllPluginsEnabled));
            Arc::new(ScopedEnablement::new(plugins, config.clone()))
        });
        let configs = self
            .configs
            .unwrap_or_else(|| config.clone() as Arc<dyn StageConfigSource>);

        PipelineEngine {
            stages: self.stages,
            channels: self.channels,
            enablement,
            configs,
            events: self.events.unwrap_or_else(|| Arc::new(NoOpEventSink)),
        }
    }
}

impl fmt::Debug for PipelineEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEngineBuilder")
            .field("stages", &self.stages.names())
            .finish_non_exhaustive()
    }
}
