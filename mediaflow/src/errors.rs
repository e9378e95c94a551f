//! Error types for the mediaflow engine.
//!
//! Two families live here: registration errors, which are raised
//! synchronously while plugins load, and the classified [`ErrorKind`]
//! taxonomy that tags every backend invocation outcome.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for mediaflow operations.
#[derive(Debug, Error)]
pub enum MediaflowError {
    /// A registry rejected a registration.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// The stage graph could not be built.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// Configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the stage, backend and service registries.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// An entry with the same key is already registered.
    #[error("{registry} '{name}' is already registered")]
    Duplicate {
        /// The registry kind ("Stage", "Backend", "Service").
        registry: &'static str,
        /// The conflicting key.
        name: String,
    },

    /// A stage declared an ordering hint against itself.
    #[error("Stage '{name}' cannot be ordered relative to itself")]
    SelfReference {
        /// The stage name.
        name: String,
    },

    /// Same-phase ordering hints form a cycle.
    #[error("{0}")]
    Cycle(#[from] CycleDetectedError),
}

impl RegistryError {
    /// Creates a duplicate-registration error.
    #[must_use]
    pub fn duplicate(registry: &'static str, name: impl Into<String>) -> Self {
        Self::Duplicate {
            registry,
            name: name.into(),
        }
    }
}

/// Error raised when same-phase ordering hints contain a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cycle detected in {phase} stage ordering: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The phase whose hints form the cycle.
    pub phase: String,
    /// The path of stages forming the cycle, first element repeated last.
    pub cycle_path: Vec<String>,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(phase: impl Into<String>, cycle_path: Vec<String>) -> Self {
        Self {
            phase: phase.into(),
            cycle_path,
        }
    }
}

/// Classification of a failed generation.
///
/// The numeric codes are stable and safe for programmatic branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unclassified failure. Fails closed.
    Unknown,
    /// Backend or channel missing.
    NotFound,
    /// Required configuration missing or invalid.
    ConfigInvalid,
    /// Owning plugin, backend or channel disabled.
    Disabled,
    /// Transport-level failure.
    NetworkError,
    /// Upstream throttling.
    RateLimited,
    /// The attempt exceeded its deadline.
    Timeout,
}

impl ErrorKind {
    /// Kinds that allow another attempt.
    pub const RETRYABLE: [Self; 3] = [Self::NetworkError, Self::RateLimited, Self::Timeout];

    /// Returns the stable numeric code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Unknown => 1,
            Self::NotFound => 2,
            Self::ConfigInvalid => 3,
            Self::Disabled => 4,
            Self::NetworkError => 5,
            Self::RateLimited => 6,
            Self::Timeout => 7,
        }
    }

    /// Looks a kind up by its numeric code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Unknown),
            2 => Some(Self::NotFound),
            3 => Some(Self::ConfigInvalid),
            4 => Some(Self::Disabled),
            5 => Some(Self::NetworkError),
            6 => Some(Self::RateLimited),
            7 => Some(Self::Timeout),
            _ => None,
        }
    }

    /// Returns true if a failed attempt of this kind may be retried.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        Self::RETRYABLE.contains(&self)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::NotFound => write!(f, "not_found"),
            Self::ConfigInvalid => write!(f, "config_invalid"),
            Self::Disabled => write!(f, "disabled"),
            Self::NetworkError => write!(f, "network_error"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// A classified, human-readable failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ClassifiedError {
    /// The classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl ClassifiedError {
    /// Creates a classified error.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the stable numeric code.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind));
        map.insert("code".to_string(), serde_json::json!(self.code()));
        map.insert("message".to_string(), serde_json::json!(self.message));
        map
    }
}

/// Error raised by a stage. Caught at the engine boundary.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StageError {
    /// Human-readable message.
    pub message: String,
    /// Optional classification for the result's error code.
    pub kind: Option<ErrorKind>,
    /// Stage that raised the error. Filled in by the chain when unset.
    pub stage: Option<String>,
}

impl StageError {
    /// Creates an unclassified stage error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
            stage: None,
        }
    }

    /// Creates a classified stage error.
    #[must_use]
    pub fn classified(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
            stage: None,
        }
    }
}

impl From<ClassifiedError> for StageError {
    fn from(err: ClassifiedError) -> Self {
        Self::classified(err.kind, err.message)
    }
}

impl From<anyhow::Error> for StageError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ErrorKind::Unknown.code(), 1);
        assert_eq!(ErrorKind::NotFound.code(), 2);
        assert_eq!(ErrorKind::Timeout.code(), 7);
        for code in 1..=7 {
            let kind = ErrorKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert!(ErrorKind::from_code(0).is_none());
    }

    #[test]
    fn test_retryable_allow_list() {
        assert!(ErrorKind::NetworkError.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::ConfigInvalid.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::Disabled.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(
            "prepare",
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
        );
        assert!(err.to_string().contains("a -> b -> a"));
        assert!(err.to_string().contains("prepare"));
    }

    #[test]
    fn test_duplicate_message() {
        let err = RegistryError::duplicate("Stage", "billing");
        assert_eq!(err.to_string(), "Stage 'billing' is already registered");
    }

    #[test]
    fn test_classified_error_to_dict() {
        let err = ClassifiedError::new(ErrorKind::RateLimited, "slow down");
        let dict = err.to_dict();
        assert_eq!(dict.get("kind").unwrap(), "rate_limited");
        assert_eq!(dict.get("code").unwrap(), 6);
    }

    #[test]
    fn test_stage_error_from_anyhow() {
        let err: StageError = anyhow::anyhow!("quota exceeded").into();
        assert_eq!(err.message, "quota exceeded");
        assert!(err.kind.is_none());
    }
}
