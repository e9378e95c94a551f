//! Generation backends and the service that invokes them.
//!
//! A backend turns a prompt, input files and parameters into artifacts.
//! Backends never run directly: the [`BackendInvocationService`] wraps
//! every call with a timeout, bounded retries, error classification and
//! redacted logging.

mod backoff;
mod classify;
mod invocation;
mod registry;
mod request_log;

pub use backoff::{BackoffStrategy, JitterStrategy, RetryBackoff};
pub use classify::classify_message;
pub use invocation::{BackendInvocationService, InvocationOptions, InvocationOutcome};
pub use registry::BackendRegistry;
pub use request_log::{generic_response_log, strip_query, GenericRequestLog, RequestLog};

use crate::core::{Artifact, ArtifactKind, InputFile};
use crate::errors::{ClassifiedError, ErrorKind};
use crate::services::HostHandle;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Everything a backend needs for one generation.
#[derive(Debug, Clone, Default)]
pub struct BackendCall {
    /// The channel's connector configuration (credentials, endpoint, model).
    pub config: Value,
    /// Input files.
    pub files: Vec<InputFile>,
    /// The prompt.
    pub prompt: String,
    /// Generation parameters.
    pub parameters: Map<String, Value>,
}

impl BackendCall {
    /// Creates a call for `prompt` with empty configuration.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            config: Value::Object(Map::new()),
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Sets the connector configuration.
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
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
}

/// Failure reported by a backend.
///
/// Backends that know why they failed set `kind`; otherwise the
/// invocation service classifies the message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BackendError {
    /// Human-readable message.
    pub message: String,
    /// Classification supplied by the backend.
    pub kind: Option<ErrorKind>,
}

impl BackendError {
    /// Creates an unclassified error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    /// Creates a classified error.
    #[must_use]
    pub fn classified(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
        }
    }

    /// Resolves the classification, falling back to the message.
    #[must_use]
    pub fn classify(&self) -> ClassifiedError {
        let kind = self
            .kind
            .unwrap_or_else(|| classify_message(&self.message));
        ClassifiedError::new(kind, self.message.clone())
    }
}

impl From<anyhow::Error> for BackendError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

impl From<ClassifiedError> for BackendError {
    fn from(err: ClassifiedError) -> Self {
        Self::classified(err.kind, err.message)
    }
}

/// A pluggable generation backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Unique backend id, referenced by a channel's connector.
    fn id(&self) -> &str;

    /// The artifact kinds this backend produces.
    fn supported_kinds(&self) -> &[ArtifactKind];

    /// The plugin that contributed this backend, if any.
    fn plugin(&self) -> Option<&str> {
        None
    }

    /// Runs one generation.
    async fn generate(
        &self,
        host: &HostHandle,
        call: &BackendCall,
    ) -> Result<Vec<Artifact>, BackendError>;

    /// Custom request log. Returning `None` uses the generic, redacted
    /// extractor.
    fn request_log(&self, _call: &BackendCall) -> Option<Value> {
        None
    }

    /// Custom response log. Returning `None` uses the generic summary.
    fn response_log(&self, _output: &[Artifact]) -> Option<Value> {
        None
    }
}
