//! The mutable per-request context.

use super::{LogLevel, StageLogSink};
use crate::backends::RequestLog;
use crate::core::{Artifact, InputFile};
use crate::errors::ErrorKind;
use crate::events::{EventSink, NoOpEventSink};
use crate::host::Channel;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Called once when preparation is complete and the backend call begins.
pub type PrepareCallback = Box<dyn FnOnce(&Map<String, Value>) + Send + Sync>;

/// The stage currently executing and its resolved configuration.
#[derive(Debug, Clone, Default)]
pub(crate) struct StageFrame {
    stage: Option<String>,
    config: Option<Value>,
}

/// State shared by the stages of a single request.
///
/// Stages read and mutate the public fields directly. Failure is
/// signalled through [`RequestContext::set_error`]; `output` is only
/// meaningful when no error is set.
pub struct RequestContext {
    request_id: Uuid,
    channel: Option<Channel>,
    /// The prompt. Stages such as preset resolution may rewrite it.
    pub prompt: String,
    /// Input files.
    pub files: Vec<InputFile>,
    /// Generation parameters forwarded to the backend.
    pub parameters: Map<String, Value>,
    /// Generated artifacts, set or replaced by stages.
    pub output: Option<Vec<Artifact>>,
    /// Task identifier assigned by a task-recording stage.
    pub task_id: Option<String>,
    /// Caller session, if any.
    pub session: Option<String>,
    /// Caller identity, if any.
    pub uid: Option<String>,
    /// Hints delivered to the caller when preparation completes.
    pub hints: Map<String, Value>,
    /// Scratch space for stage-to-stage hand-off.
    pub data: HashMap<String, Value>,
    /// Request log of the backend invocation.
    pub request_log: Option<RequestLog>,
    /// Response log of the backend invocation.
    pub response_log: Option<Value>,
    error: Option<String>,
    error_kind: Option<ErrorKind>,
    logs: StageLogSink,
    frame: StageFrame,
    on_prepare_complete: Option<PrepareCallback>,
    events: Arc<dyn EventSink>,
}

impl RequestContext {
    /// Creates a context for `prompt` with no channel.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            channel: None,
            prompt: prompt.into(),
            files: Vec::new(),
            parameters: Map::new(),
            output: None,
            task_id: None,
            session: None,
            uid: None,
            hints: Map::new(),
            data: HashMap::new(),
            request_log: None,
            response_log: None,
            error: None,
            error_kind: None,
            logs: StageLogSink::new(),
            frame: StageFrame::default(),
            on_prepare_complete: None,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the resolved channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Sets the input files.
    #[must_use]
    pub fn with_files(mut self, files: Vec<InputFile>) -> Self {
        self.files = files;
        self
    }

    /// Sets the generation parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the caller session and identity.
    #[must_use]
    pub fn with_caller(mut self, session: Option<String>, uid: Option<String>) -> Self {
        self.session = session;
        self.uid = uid;
        self
    }

    /// Sets the prepare-complete callback.
    #[must_use]
    pub fn with_prepare_callback(mut self, callback: Option<PrepareCallback>) -> Self {
        self.on_prepare_complete = callback;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns the resolved channel.
    #[must_use]
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Marks the request as failed.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.error_kind = None;
    }

    /// Marks the request as failed with a classification.
    pub fn set_error_with_kind(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.error = Some(message.into());
        self.error_kind = Some(kind);
    }

    /// Clears a previously set error.
    pub fn clear_error(&mut self) {
        self.error = None;
        self.error_kind = None;
    }

    /// Returns the error message, if the request has failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the error classification, if one was given.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// Returns true if an error is set.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the name of the stage currently executing.
    #[must_use]
    pub fn current_stage(&self) -> Option<&str> {
        self.frame.stage.as_deref()
    }

    /// Returns the configuration resolved for the current stage.
    #[must_use]
    pub fn stage_config(&self) -> Option<&Value> {
        self.frame.config.as_ref()
    }

    /// Writes a log entry attributed to the current stage.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let stage = self.frame.stage.clone();
        self.logs.push(stage.as_deref(), level, message);
    }

    pub(crate) fn log_for(&mut self, stage: Option<&str>, level: LogLevel, message: impl Into<String>) {
        self.logs.push(stage, level, message);
    }

    /// Writes an info-level log entry.
    pub fn log_info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    /// Writes a warn-level log entry.
    pub fn log_warn(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    /// Returns the accumulated stage logs.
    #[must_use]
    pub fn logs(&self) -> &StageLogSink {
        &self.logs
    }

    /// Delivers `hints` to the caller's prepare-complete callback.
    ///
    /// Only the first call reaches the callback.
    pub fn notify_prepare_complete(&mut self) {
        if let Some(callback) = self.on_prepare_complete.take() {
            callback(&self.hints);
        }
    }

    /// Emits an event tagged with the request id and channel.
    pub fn emit(&self, event_type: &str, data: Option<Value>) {
        let mut enriched = data.unwrap_or_else(|| Value::Object(Map::new()));
        if let Value::Object(ref mut map) = enriched {
            map.insert("request_id".to_string(), Value::String(self.request_id.to_string()));
            if let Some(ref channel) = self.channel {
                map.insert("channel".to_string(), Value::String(channel.id.clone()));
            }
        }
        self.events.try_emit(event_type, Some(enriched));
    }

    pub(crate) fn enter_stage(&mut self, name: &str, config: Option<Value>) -> StageFrame {
        std::mem::replace(
            &mut self.frame,
            StageFrame {
                stage: Some(name.to_string()),
                config,
            },
        )
    }

    pub(crate) fn leave_stage(&mut self, previous: StageFrame) {
        self.frame = previous;
    }

    pub(crate) fn take_logs(&mut self) -> StageLogSink {
        std::mem::take(&mut self.logs)
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("channel", &self.channel.as_ref().map(|c| &c.id))
            .field("prompt", &self.prompt)
            .field("files", &self.files.len())
            .field("output", &self.output.as_ref().map(Vec::len))
            .field("error", &self.error)
            .field("current_stage", &self.frame.stage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use parking_lot::Mutex;

    #[test]
    fn test_error_signalling() {
        let mut ctx = RequestContext::new("a cat");
        assert!(!ctx.has_error());

        ctx.set_error_with_kind(ErrorKind::Disabled, "billing refused");
        assert_eq!(ctx.error(), Some("billing refused"));
        assert_eq!(ctx.error_kind(), Some(ErrorKind::Disabled));

        ctx.set_error("plain");
        assert_eq!(ctx.error_kind(), None);

        ctx.clear_error();
        assert!(!ctx.has_error());
    }

    #[test]
    fn test_stage_frames_nest_and_restore() {
        let mut ctx = RequestContext::new("p");
        let outer = ctx.enter_stage("outer", Some(serde_json::json!({"o": 1})));
        ctx.log_info("outer before");

        let inner = ctx.enter_stage("inner", None);
        assert_eq!(ctx.current_stage(), Some("inner"));
        assert!(ctx.stage_config().is_none());
        ctx.log_warn("inner");
        ctx.leave_stage(inner);

        assert_eq!(ctx.current_stage(), Some("outer"));
        assert_eq!(ctx.stage_config(), Some(&serde_json::json!({"o": 1})));
        ctx.log_info("outer after");
        ctx.leave_stage(outer);

        assert_eq!(ctx.current_stage(), None);
        assert_eq!(ctx.logs().for_stage("outer").len(), 2);
        assert_eq!(ctx.logs().for_stage("inner").len(), 1);
    }

    #[test]
    fn test_prepare_callback_fires_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut ctx = RequestContext::new("p").with_prepare_callback(Some(Box::new(move |hints| {
            sink.lock().push(hints.clone());
        })));

        ctx.hints.insert("queue".to_string(), serde_json::json!(3));
        ctx.notify_prepare_complete();
        ctx.notify_prepare_complete();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("queue"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_emit_tags_request_and_channel() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = RequestContext::new("p")
            .with_channel(Channel::new("ch-1", "one", "echo"))
            .with_event_sink(sink.clone());

        ctx.emit("stage.started", Some(serde_json::json!({"stage": "a"})));

        let events = sink.events();
        let data = events[0].1.as_ref().unwrap();
        assert_eq!(data["channel"], "ch-1");
        assert_eq!(data["request_id"], ctx.request_id().to_string());
        assert_eq!(data["stage"], "a");
    }
}
