//! Testing utilities for mediaflow pipelines.
//!
//! This module provides:
//! - Mock backends (echo, hanging, scripted)
//! - Mock stages that record the onion traversal or count calls

mod backends;
mod stages;

pub use backends::{EchoBackend, HangingBackend, ScriptedBackend};
pub use stages::{FailingStage, RecordingStage, SpyStage, StoppingStage};
