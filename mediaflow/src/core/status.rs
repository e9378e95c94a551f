//! Phase and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse ordering bucket a stage belongs to.
///
/// Variants are declared in execution order; the derived `Ord` is the
/// phase ordering used by the graph builder.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Input validation, authorization, preset resolution.
    #[default]
    Prepare,
    /// Billing pre-authorization and other work that must see the final prompt.
    PreRequest,
    /// The backend call itself.
    Request,
    /// Asset caching and output post-processing.
    PostRequest,
    /// Billing settlement and task recording.
    Finalize,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Self; 5] = [
        Self::Prepare,
        Self::PreRequest,
        Self::Request,
        Self::PostRequest,
        Self::Finalize,
    ];

    /// Returns the position of the phase in the execution order.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepare => write!(f, "prepare"),
            Self::PreRequest => write!(f, "pre-request"),
            Self::Request => write!(f, "request"),
            Self::PostRequest => write!(f, "post-request"),
            Self::Finalize => write!(f, "finalize"),
        }
    }
}

/// Signal returned by a stage.
///
/// `Stop` ends the chain for the request without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Proceed with the rest of the chain.
    Continue,
    /// End the chain here.
    Stop,
}

impl RunStatus {
    /// Returns true for `Stop`.
    #[must_use]
    pub fn is_stop(self) -> bool {
        matches!(self, Self::Stop)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Stop => write!(f, "stop"),
        }
    }
}
