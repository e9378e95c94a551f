//! Pipeline execution.
//!
//! The [`PipelineEngine`] resolves the request's channel, builds a fresh
//! context, drops the stages disabled for that channel and runs the rest
//! as an onion chain. The built-in [`RequestStage`] performs the backend
//! call from inside the chain.

mod engine;
mod request_stage;
mod types;

pub use engine::{PipelineEngine, PipelineEngineBuilder};
pub use request_stage::{RequestStage, REQUEST_STAGE};
pub use types::{GenerationRequest, GenerationResult};
