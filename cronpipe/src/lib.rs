//! # Cronpipe
//!
//! Lock-guarded, ledger-backed orchestration for a scheduled multi-stage
//! data pipeline.
//!
//! An external scheduler calls authenticated HTTP endpoints at fixed
//! cadences. Each call either runs the whole pipeline
//! (ingest → enrich → analyze → aggregate → coordination → briefing) or one
//! stage on its own, under a distributed TTL lock so overlapping fires never
//! run the same work twice. Every run and every stage is recorded in a
//! durable ledger.
//!
//! - **Mutual exclusion**: atomic set-if-absent locks with owner-checked release
//! - **Ledger**: runs finalized once, stage records upserted on `(run, stage)`
//! - **Failure propagation**: a failed stage skips everything after it
//! - **Recoverable errors**: per-item errors downgrade the run verdict only
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cronpipe::prelude::*;
//! use std::sync::Arc;
//!
//! let stages = StageRegistry::new()
//!     .with(Arc::new(IngestStage::new()))
//!     .with(Arc::new(EnrichStage::new()));
//!
//! let orchestrator = Orchestrator::new(
//!     LockManager::new(Arc::new(InMemoryLockStore::new())),
//!     Arc::new(InMemoryLedger::new()),
//!     stages,
//! );
//!
//! match FullPipelineExecutor::new(orchestrator).run("manual").await {
//!     PipelineOutcome::Finished(report) => println!("{} {}", report.run_id, report.status),
//!     other => println!("{other:?}"),
//! }
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
    clippy::missing_panics_doc
)]

pub mod api;
pub mod cache;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod lock;
pub mod pipeline;
pub mod registry;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheInvalidator, LoggingCacheInvalidator, NoOpCacheInvalidator};
    pub use crate::core::{RunStatus, StageName, StageRunStatus};
    pub use crate::errors::{
        ConfigError, LedgerError, LockError, OrchestratorError, StageError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::ledger::{InMemoryLedger, Ledger, PipelineRun, PipelineStageRun};
    pub use crate::lock::{InMemoryLockStore, LockGuard, LockManager, LockStore};
    pub use crate::pipeline::{
        FullPipelineExecutor, Orchestrator, PipelineOutcome, RunReport, SkipReason,
        StageOutcome, StandaloneOutcome, StandaloneStageExecutor,
    };
    pub use crate::registry::{JobKind, JobSchedule};
    pub use crate::stages::{FnStage, NoOpStage, Stage, StageRegistry, StageResult};
    pub use crate::utils::{generate_uuid, now_utc, Timestamp};
}
