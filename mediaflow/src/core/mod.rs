//! Core domain model types for mediaflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Phase and run status enums
//! - Generated artifacts and input files

mod artifact;
mod status;

pub use artifact::{Artifact, ArtifactKind, InputFile};
pub use status::{Phase, RunStatus};
