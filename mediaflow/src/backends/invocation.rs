//! Backend invocation with timeout, retries and redacted logging.

use super::{
    generic_response_log, Backend, BackendCall, BackendRegistry, GenericRequestLog, RequestLog,
    RetryBackoff,
};
use crate::core::Artifact;
use crate::errors::{ClassifiedError, ErrorKind};
use crate::host::{AllPluginsEnabled, PluginStatus};
use crate::services::HostHandle;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-call invocation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationOptions {
    /// Deadline of each attempt.
    pub timeout: Duration,
    /// Additional attempts after the first one.
    pub retries: u32,
    /// Pause between attempts.
    pub backoff: RetryBackoff,
}

impl Default for InvocationOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            retries: 0,
            backoff: RetryBackoff::none(),
        }
    }
}

impl InvocationOptions {
    /// Creates options with no backoff.
    #[must_use]
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self {
            timeout,
            retries,
            backoff: RetryBackoff::none(),
        }
    }

    /// Sets the backoff between attempts.
    #[must_use]
    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the maximum number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// The tagged result of one invocation. Exactly one of `output` and
/// `error` is set.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    /// Whether the backend produced output.
    pub success: bool,
    /// Generated artifacts on success.
    pub output: Option<Vec<Artifact>>,
    /// Human-readable error on failure.
    pub error: Option<String>,
    /// Classification on failure.
    pub error_kind: Option<ErrorKind>,
    /// Stable numeric code of `error_kind`.
    pub error_code: Option<u16>,
    /// Redacted request log. Absent when the backend was never called.
    pub request_log: Option<RequestLog>,
    /// Response summary on success.
    pub response_log: Option<Value>,
    /// Attempts made.
    pub attempts: u32,
}

impl InvocationOutcome {
    fn succeeded(
        output: Vec<Artifact>,
        request_log: RequestLog,
        response_log: Value,
        attempts: u32,
    ) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            error_kind: None,
            error_code: None,
            request_log: Some(request_log),
            response_log: Some(response_log),
            attempts,
        }
    }

    fn failed(error: ClassifiedError, request_log: Option<RequestLog>, attempts: u32) -> Self {
        Self {
            success: false,
            output: None,
            error_code: Some(error.code()),
            error_kind: Some(error.kind),
            error: Some(error.message),
            request_log,
            response_log: None,
            attempts,
        }
    }

    /// Returns the failure as a classified error.
    #[must_use]
    pub fn classified_error(&self) -> Option<ClassifiedError> {
        match (&self.error, self.error_kind) {
            (Some(message), Some(kind)) => Some(ClassifiedError::new(kind, message.clone())),
            _ => None,
        }
    }
}

/// Invokes backends from a [`BackendRegistry`].
///
/// Never returns an error: every failure, including a missing backend,
/// is reported through [`InvocationOutcome`].
#[derive(Clone)]
pub struct BackendInvocationService {
    backends: BackendRegistry,
    plugins: Arc<dyn PluginStatus>,
    host: HostHandle,
}

impl BackendInvocationService {
    /// Creates a service treating every plugin as enabled.
    #[must_use]
    pub fn new(backends: BackendRegistry, host: HostHandle) -> Self {
        Self {
            backends,
            plugins: Arc::new(AllPluginsEnabled),
            host,
        }
    }

    /// Sets the plugin status consulted before each call.
    #[must_use]
    pub fn with_plugin_status(mut self, plugins: Arc<dyn PluginStatus>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Returns the backend registry.
    #[must_use]
    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Runs `call` on the backend `backend_id`.
    ///
    /// Makes up to `options.retries + 1` sequential attempts, each raced
    /// against `options.timeout`. Only network, rate-limit and timeout
    /// failures are retried. An attempt that times out is abandoned: the
    /// backend call keeps running in the background and its result is
    /// discarded.
    pub async fn execute(
        &self,
        backend_id: &str,
        call: BackendCall,
        options: &InvocationOptions,
    ) -> InvocationOutcome {
        let Some(backend) = self.backends.get(backend_id) else {
            tracing::warn!(backend = %backend_id, "Backend not found");
            return InvocationOutcome::failed(
                ClassifiedError::new(
                    ErrorKind::NotFound,
                    format!("Backend '{backend_id}' not found"),
                ),
                None,
                0,
            );
        };

        if let Some(plugin) = backend.plugin() {
            if !self.plugins.is_plugin_enabled(plugin) {
                tracing::warn!(backend = %backend_id, %plugin, "Backend plugin is disabled");
                return InvocationOutcome::failed(
                    ClassifiedError::new(
                        ErrorKind::Disabled,
                        format!("Backend '{backend_id}' is disabled (plugin '{plugin}')"),
                    ),
                    None,
                    0,
                );
            }
        }

        let request_log = backend.request_log(&call).map_or_else(
            || RequestLog::Generic(GenericRequestLog::from_call(backend_id, &call)),
            RequestLog::Custom,
        );
        tracing::debug!(
            backend = %backend_id,
            request = %request_log.to_value(),
            "Backend request"
        );

        let call = Arc::new(call);
        let max_attempts = options.max_attempts();
        let started = Instant::now();
        let mut attempt = 1;

        loop {
            let attempt_started = Instant::now();
            match self.attempt(&backend, &call, options.timeout).await {
                Ok(output) => {
                    let response_log = backend
                        .response_log(&output)
                        .unwrap_or_else(|| generic_response_log(&output));
                    tracing::debug!(
                        backend = %backend_id,
                        response = %response_log,
                        "Backend response"
                    );
                    tracing::info!(
                        backend = %backend_id,
                        attempt,
                        artifacts = output.len(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Backend call succeeded"
                    );
                    return InvocationOutcome::succeeded(output, request_log, response_log, attempt);
                }
                Err(err) if err.kind.is_retryable() && attempt < max_attempts => {
                    let delay = options.backoff.delay(attempt);
                    tracing::warn!(
                        backend = %backend_id,
                        attempt,
                        max_attempts,
                        error_code = err.code(),
                        error = %err.message,
                        attempt_ms = attempt_started.elapsed().as_millis() as u64,
                        delay_ms = delay.as_millis() as u64,
                        "Backend attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        backend = %backend_id,
                        attempt,
                        error_code = err.code(),
                        error_kind = %err.kind,
                        error = %err.message,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Backend call failed"
                    );
                    return InvocationOutcome::failed(err, Some(request_log), attempt);
                }
            }
        }
    }

    async fn attempt(
        &self,
        backend: &Arc<dyn Backend>,
        call: &Arc<BackendCall>,
        timeout: Duration,
    ) -> Result<Vec<Artifact>, ClassifiedError> {
        let task_backend = Arc::clone(backend);
        let task_call = Arc::clone(call);
        let host = self.host.clone();
        // Dropping the handle on timeout detaches the task instead of
        // cancelling it.
        let handle =
            tokio::spawn(async move { task_backend.generate(&host, &task_call).await });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(err))) => Err(err.classify()),
            Ok(Err(join_err)) => {
                let message = if join_err.is_panic() {
                    format!("Backend '{}' panicked", backend.id())
                } else {
                    format!("Backend '{}' was cancelled", backend.id())
                };
                Err(ClassifiedError::new(ErrorKind::Unknown, message))
            }
            Err(_) => Err(ClassifiedError::new(
                ErrorKind::Timeout,
                format!(
                    "Backend '{}' timed out after {}ms",
                    backend.id(),
                    timeout.as_millis()
                ),
            )),
        }
    }
}

impl fmt::Debug for BackendInvocationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendInvocationService")
            .field("backends", &self.backends)
            .finish_non_exhaustive()
    }
}
