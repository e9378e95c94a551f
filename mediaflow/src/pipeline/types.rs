//! The engine's external request and result types.

use crate::context::{PrepareCallback, StageLogEntry};
use crate::core::{Artifact, InputFile};
use crate::errors::{ClassifiedError, ErrorKind};
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// A generation request addressed to a channel.
pub struct GenerationRequest {
    /// Channel id or name.
    pub channel: String,
    /// The prompt.
    pub prompt: String,
    /// Input files.
    pub files: Vec<InputFile>,
    /// Generation parameters.
    pub parameters: Map<String, Value>,
    /// Caller session, if any.
    pub session: Option<String>,
    /// Caller identity, if any.
    pub uid: Option<String>,
    /// Receives the stage-provided hints once preparation is complete.
    pub on_prepare_complete: Option<PrepareCallback>,
}

impl GenerationRequest {
    /// Creates a request for `prompt` on `channel`.
    #[must_use]
    pub fn new(channel: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            prompt: prompt.into(),
            files: Vec::new(),
            parameters: Map::new(),
            session: None,
            uid: None,
            on_prepare_complete: None,
        }
    }

    /// Sets the input files.
    #[must_use]
    pub fn with_files(mut self, files: Vec<InputFile>) -> Self {
        self.files = files;
        self
    }

    /// Adds one generation parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
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
    pub fn with_caller(mut self, session: impl Into<String>, uid: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self.uid = Some(uid.into());
        self
    }

    /// Sets the prepare-complete callback.
    #[must_use]
    pub fn on_prepare_complete(
        mut self,
        callback: impl FnOnce(&Map<String, Value>) + Send + Sync + 'static,
    ) -> Self {
        self.on_prepare_complete = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("channel", &self.channel)
            .field("prompt", &self.prompt)
            .field("files", &self.files.len())
            .field("parameters", &self.parameters)
            .field("session", &self.session)
            .field("uid", &self.uid)
            .field("on_prepare_complete", &self.on_prepare_complete.is_some())
            .finish()
    }
}

/// The outcome of a generation request.
///
/// Either `success` is true and `output` is set, or `success` is false
/// and `error` plus `error_code` are set.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Whether the request succeeded.
    pub success: bool,
    /// Generated artifacts on success.
    pub output: Option<Vec<Artifact>>,
    /// Human-readable error on failure.
    pub error: Option<String>,
    /// Classification on failure.
    pub error_kind: Option<ErrorKind>,
    /// Stable numeric code on failure.
    pub error_code: Option<u16>,
    /// Task id assigned by a stage.
    pub task_id: Option<String>,
    /// Wall time spent in the engine.
    pub duration: Duration,
    /// Hints delivered at prepare-complete.
    pub hints: Map<String, Value>,
    /// Stage log entries, in write order.
    pub logs: Vec<StageLogEntry>,
    /// Request id used in events and logs.
    pub request_id: Uuid,
}

impl GenerationResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(request_id: Uuid, output: Vec<Artifact>, duration: Duration) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            error_kind: None,
            error_code: None,
            task_id: None,
            duration,
            hints: Map::new(),
            logs: Vec::new(),
            request_id,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(request_id: Uuid, error: ClassifiedError, duration: Duration) -> Self {
        Self {
            success: false,
            output: None,
            error_code: Some(error.code()),
            error_kind: Some(error.kind),
            error: Some(error.message),
            task_id: None,
            duration,
            hints: Map::new(),
            logs: Vec::new(),
            request_id,
        }
    }

    /// Converts to a JSON representation.
    #[must_use]
    pub fn to_dict(&self) -> Value {
        json!({
            "success": self.success,
            "output": self.output,
            "error": self.error,
            "error_code": self.error_code,
            "task_id": self.task_id,
            "duration_ms": self.duration.as_secs_f64() * 1000.0,
            "hints": self.hints,
            "logs": self.logs,
            "request_id": self.request_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_failure_carries_code() {
        let result = GenerationResult::failure(
            Uuid::new_v4(),
            ClassifiedError::new(ErrorKind::NotFound, "Channel 'x' not found"),
            Duration::from_millis(3),
        );

        assert!(!result.success);
        assert!(result.output.is_none());
        assert_eq!(result.error_code, Some(2));
        assert_eq!(result.to_dict()["error"], "Channel 'x' not found");
    }

    #[test]
    fn test_success_dict() {
        let result = GenerationResult::success(
            Uuid::nil(),
            vec![Artifact::text("hi")],
            Duration::from_millis(10),
        );

        let dict = result.to_dict();
        assert_eq!(dict["success"], true);
        assert_eq!(dict["output"][0]["content"], "hi");
        assert_eq!(dict["error"], Value::Null);
        assert_eq!(dict["duration_ms"], 10.0);
    }

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("sd-main", "a castle")
            .with_parameter("steps", json!(20))
            .with_caller("s-1", "u-1")
            .on_prepare_complete(|_| {});

        assert_eq!(request.parameters["steps"], 20);
        assert_eq!(request.uid.as_deref(), Some("u-1"));
        assert!(request.on_prepare_complete.is_some());
        assert!(format!("{request:?}").contains("sd-main"));
    }
}
