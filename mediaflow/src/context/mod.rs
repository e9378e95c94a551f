//! Per-request state shared by the stages of one request.
//!
//! A [`RequestContext`] is created fresh for every call to the engine and
//! dropped when the call returns. It is never shared between requests.

mod logs;
mod request;

pub use logs::{LogLevel, StageLogEntry, StageLogSink};
pub use request::{PrepareCallback, RequestContext};
