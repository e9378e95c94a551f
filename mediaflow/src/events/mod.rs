//! Pipeline lifecycle events.
//!
//! The engine reports request and stage progress through an [`EventSink`].
//! Sinks must never fail the request that emits into them.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event names emitted by the engine.
pub mod names {
    /// A request entered the engine.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A request finished successfully.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A request finished with an error.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// A stage was entered.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage returned.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage raised an error.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A stage was left out for this request.
    pub const STAGE_SKIPPED: &str = "stage.skipped";
}
