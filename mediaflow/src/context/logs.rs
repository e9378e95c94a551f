//! Per-stage log collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a stage log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal progress.
    Info,
    /// Something unexpected that did not fail the request.
    Warn,
    /// A failure.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One line written by a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageLogEntry {
    /// The stage that wrote the entry, `None` for engine-level entries.
    pub stage: Option<String>,
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
}

/// Ordered collection of stage log entries for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageLogSink {
    entries: Vec<StageLogEntry>,
}

impl StageLogSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and mirrors it to `tracing` at debug level.
    pub fn push(&mut self, stage: Option<&str>, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(stage = stage.unwrap_or("-"), %level, "{}", message);
        self.entries.push(StageLogEntry {
            stage: stage.map(str::to_string),
            level,
            message,
            timestamp: Utc::now(),
        });
    }

    /// Returns all entries.
    #[must_use]
    pub fn entries(&self) -> &[StageLogEntry] {
        &self.entries
    }

    /// Returns the entries written by one stage.
    #[must_use]
    pub fn for_stage(&self, stage: &str) -> Vec<&StageLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.stage.as_deref() == Some(stage))
            .collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the sink, returning its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<StageLogEntry> {
        self.entries
    }
}
