//! Mock backends for testing.

use crate::backends::{Backend, BackendCall, BackendError};
use crate::core::{Artifact, ArtifactKind};
use crate::services::HostHandle;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

type Scripted = Result<Vec<Artifact>, BackendError>;

/// Returns the prompt as a single text artifact.
///
/// The connector configuration it was called with is attached as the
/// `config` metadata entry.
#[derive(Debug)]
pub struct EchoBackend {
    id: String,
    plugin: Option<String>,
    calls: Mutex<usize>,
    prompts: Mutex<Vec<String>>,
}

impl EchoBackend {
    /// Creates an echo backend.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plugin: None,
            calls: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Attributes the backend to a plugin.
    #[must_use]
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }

    /// Returns the prompts received, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Backend for EchoBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn supported_kinds(&self) -> &[ArtifactKind] {
        &[ArtifactKind::Text]
    }

    fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    async fn generate(
        &self,
        _host: &HostHandle,
        call: &BackendCall,
    ) -> Result<Vec<Artifact>, BackendError> {
        *self.calls.lock() += 1;
        self.prompts.lock().push(call.prompt.clone());
        Ok(vec![
            Artifact::text(call.prompt.clone()).with_metadata("config", call.config.clone())
        ])
    }
}

/// Never answers, or answers only after a fixed delay.
#[derive(Debug)]
pub struct HangingBackend {
    id: String,
    delay: Option<Duration>,
    calls: Mutex<usize>,
    completed: Mutex<usize>,
}

impl HangingBackend {
    /// Creates a backend whose calls never complete.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            delay: None,
            calls: Mutex::new(0),
            completed: Mutex::new(0),
        }
    }

    /// Creates a backend that answers after `delay`.
    #[must_use]
    pub fn for_duration(id: impl Into<String>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(id)
        }
    }

    /// Returns the number of calls started.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }

    /// Returns the number of calls that ran to completion.
    #[must_use]
    pub fn completed(&self) -> usize {
        *self.completed.lock()
    }
}

#[async_trait]
impl Backend for HangingBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn supported_kinds(&self) -> &[ArtifactKind] {
        &[ArtifactKind::Text]
    }

    async fn generate(
        &self,
        _host: &HostHandle,
        _call: &BackendCall,
    ) -> Result<Vec<Artifact>, BackendError> {
        *self.calls.lock() += 1;
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => std::future::pending::<()>().await,
        }
        *self.completed.lock() += 1;
        Ok(vec![Artifact::text("late")])
    }
}

/// Plays back a fixed list of responses, repeating the last one once the
/// list is exhausted.
#[derive(Debug)]
pub struct ScriptedBackend {
    id: String,
    script: Vec<Scripted>,
    panics: bool,
    calls: Mutex<usize>,
}

impl ScriptedBackend {
    /// Creates a backend answering with `script` in order.
    #[must_use]
    pub fn new(id: impl Into<String>, script: Vec<Scripted>) -> Self {
        Self {
            id: id.into(),
            script,
            panics: false,
            calls: Mutex::new(0),
        }
    }

    /// Creates a backend that fails every call with `error`.
    #[must_use]
    pub fn always_failing(id: impl Into<String>, error: BackendError) -> Self {
        Self::new(id, vec![Err(error)])
    }

    /// Creates a backend that panics on every call.
    #[must_use]
    pub fn panicking(id: impl Into<String>) -> Self {
        Self {
            panics: true,
            ..Self::new(id, Vec::new())
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn supported_kinds(&self) -> &[ArtifactKind] {
        &[ArtifactKind::Image, ArtifactKind::Text]
    }

    async fn generate(
        &self,
        _host: &HostHandle,
        _call: &BackendCall,
    ) -> Result<Vec<Artifact>, BackendError> {
        let index = {
            let mut calls = self.calls.lock();
            *calls += 1;
            *calls - 1
        };
        assert!(!self.panics, "scripted backend '{}' panicked", self.id);

        self.script
            .get(index)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or_else(|| Err(BackendError::new("script is empty")))
    }
}
