//! # Mediaflow
//!
//! A stage pipeline engine for dispatching multimedia generation requests
//! to pluggable backends.
//!
//! Mediaflow provides:
//!
//! - **Phased stage registry**: plugins contribute stages to fixed phases,
//!   with optional same-phase ordering hints
//! - **Onion execution**: every stage wraps the rest of the chain and can
//!   work on the way in, on the way out, or stop the request
//! - **Per-channel enablement**: stages are switched on or off per plugin,
//!   per channel and globally
//! - **Backend invocation**: timeouts, bounded retries, classified errors
//!   and redacted request logs around every backend call
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mediaflow::prelude::*;
//!
//! let backends = BackendRegistry::new();
//! let _echo = backends.register(Arc::new(EchoBackend::new("echo")))?;
//!
//! let stages = StageRegistry::new();
//! let invoker = BackendInvocationService::new(backends, HostHandle::default());
//! let _request = stages.register(
//!     RequestStage::new(invoker, InvocationSettings::default()).into_definition(),
//! )?;
//!
//! let channels = Arc::new(InMemoryChannels::with_channels(vec![
//!     Channel::new("1", "main", "echo"),
//! ]));
//! let engine = PipelineEngine::builder(stages, channels).build();
//!
//! let result = engine.execute(GenerationRequest::new("main", "a cat")).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation
)]

pub mod backends;
pub mod config;
pub mod context;
pub mod core;
pub mod disposer;
pub mod errors;
pub mod events;
pub mod host;
pub mod observability;
pub mod pipeline;
pub mod services;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backends::{
        Backend, BackendCall, BackendError, BackendInvocationService, BackendRegistry,
        InvocationOptions, InvocationOutcome, RequestLog,
    };
    pub use crate::config::{EngineConfig, InvocationSettings, StageSettings};
    pub use crate::context::{LogLevel, RequestContext};
    pub use crate::core::{Artifact, ArtifactKind, InputFile, Phase, RunStatus};
    pub use crate::disposer::{Disposer, DisposerSet};
    pub use crate::errors::{
        ClassifiedError, CycleDetectedError, ErrorKind, MediaflowError, RegistryError,
        StageError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::host::{
        Channel, ChannelResolver, InMemoryChannels, PluginStates, PluginStatus,
        ScopedEnablement, StageConfigSource, StageEnablement,
    };
    pub use crate::pipeline::{
        GenerationRequest, GenerationResult, PipelineEngine, RequestStage,
    };
    pub use crate::services::{HostHandle, ServiceLocator};
    pub use crate::stages::{
        ExecutionGraph, FnStage, Next, Stage, StageDefinition, StageRegistry, StageResult,
    };
}
