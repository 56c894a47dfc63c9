//! Orchestration events.
//!
//! Executors report lifecycle transitions to an [`EventSink`] in addition to
//! writing the ledger. Sinks never fail the caller.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Emitted after a run row is opened.
pub const RUN_STARTED: &str = "pipeline.run.started";
/// Emitted after a run row is finalized.
pub const RUN_FINISHED: &str = "pipeline.run.finished";
/// Emitted before a stage's work starts.
pub const STAGE_STARTED: &str = "pipeline.stage.started";
/// Emitted after a stage returns a result.
pub const STAGE_COMPLETED: &str = "pipeline.stage.completed";
/// Emitted after a stage fails.
pub const STAGE_FAILED: &str = "pipeline.stage.failed";
/// Emitted for each stage skipped after an upstream failure.
pub const STAGE_SKIPPED: &str = "pipeline.stage.skipped";
/// Emitted when an invocation returns without running because its lock is held.
pub const LOCK_CONTENDED: &str = "pipeline.lock.contended";
