//! Engine configuration.
//!
//! Loaded from JSON. Every field has a default so an empty object is a
//! valid configuration.

use crate::backends::{InvocationOptions, RetryBackoff};
use crate::errors::MediaflowError;
use crate::host::StageConfigSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Defaults for backend invocation.
    #[serde(default)]
    pub invocation: InvocationSettings,
    /// Global per-stage settings, keyed by stage name or config group.
    #[serde(default)]
    pub stages: HashMap<String, StageSettings>,
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, MediaflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a configuration from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MediaflowError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            MediaflowError::Config(format!("{}: {e}", path.display()))
        })
    }

    /// Sets the default invocation timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.invocation.timeout_ms = timeout_ms;
        self
    }

    /// Sets the default retry count.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.invocation.retries = retries;
        self
    }

    /// Adds settings for a stage or config group.
    #[must_use]
    pub fn with_stage(mut self, key: impl Into<String>, settings: StageSettings) -> Self {
        self.stages.insert(key.into(), settings);
        self
    }

    /// Returns the global enabled flag for a stage, checking its config
    /// group when the stage has no entry of its own.
    #[must_use]
    pub fn stage_enabled(&self, name: &str, config_group: Option<&str>) -> Option<bool> {
        self.stages
            .get(name)
            .and_then(|s| s.enabled)
            .or_else(|| {
                config_group
                    .and_then(|group| self.stages.get(group))
                    .and_then(|s| s.enabled)
            })
    }
}

impl StageConfigSource for EngineConfig {
    fn stage_config(&self, name: &str) -> Option<serde_json::Value> {
        self.stages.get(name).and_then(|s| s.config.clone())
    }
}

/// Default invocation parameters for the built-in request stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationSettings {
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Additional attempts after the first one.
    #[serde(default)]
    pub retries: u32,
    /// Pause between attempts.
    #[serde(default)]
    pub backoff: RetryBackoff,
}

fn default_timeout_ms() -> u64 {
    600_000
}

impl Default for InvocationSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retries: 0,
            backoff: RetryBackoff::default(),
        }
    }
}

impl InvocationSettings {
    /// Gets the timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Converts to invocation options.
    #[must_use]
    pub fn options(&self) -> InvocationOptions {
        InvocationOptions::new(self.timeout(), self.retries).with_backoff(self.backoff)
    }
}

/// Global settings for one stage or config group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSettings {
    /// Global on/off switch. `None` defers to the default (on).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Stage configuration handed to the stage at invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl StageSettings {
    /// Settings that only toggle the stage.
    #[must_use]
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            config: None,
        }
    }

    /// Settings that only carry configuration.
    #[must_use]
    pub fn with_config(config: serde_json::Value) -> Self {
        Self {
            enabled: None,
            config: Some(config),
        }
    }
}
