//! Durable run and stage ledger.
//!
//! The ledger is the audit trail of every invocation that got past lock
//! acquisition. Rows are never deleted. A run is written twice (open, then
//! finalize once); stage rows are written through an atomic insert-or-update
//! keyed on `(pipeline_run_id, stage)` so pre-registration, skip records and
//! terminal writes never produce duplicates.

mod memory;
mod models;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::InMemoryLedger;
pub use models::{NewPipelineRun, PipelineRun, PipelineStageRun, RunMetadata, UPSTREAM_FAILED_REASON};
#[cfg(feature = "postgres")]
pub use postgres::PgLedger;

use async_trait::async_trait;
use std::fmt::Debug;
use uuid::Uuid;

use crate::core::RunStatus;
use crate::errors::LedgerError;
use crate::utils::Timestamp;

/// Storage for pipeline runs and their stage records.
#[async_trait]
pub trait Ledger: Send + Sync + Debug {
    /// Opens a run in `started` status and returns it with its new id.
    async fn insert_run(&self, run: NewPipelineRun) -> Result<PipelineRun, LedgerError>;

    /// Writes the run's terminal status exactly once.
    ///
    /// Fails with [`LedgerError::RunFinalized`] if the run is already
    /// terminal and [`LedgerError::RunNotFound`] if it does not exist.
    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        completed_at: Timestamp,
        error: Option<String>,
    ) -> Result<(), LedgerError>;

    /// Inserts or updates the record for `(pipeline_run_id, stage)` in one
    /// atomic operation.
    async fn upsert_stage_run(&self, record: &PipelineStageRun) -> Result<(), LedgerError>;

    /// Reads one run.
    async fn get_run(&self, run_id: Uuid) -> Result<Option<PipelineRun>, LedgerError>;

    /// Stage records of a run, in pipeline order.
    async fn stage_runs(&self, run_id: Uuid) -> Result<Vec<PipelineStageRun>, LedgerError>;

    /// Most recent runs, newest first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<PipelineRun>, LedgerError>;
}

pub(crate) fn ensure_terminal(run_id: Uuid, status: RunStatus) -> Result<(), LedgerError> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(LedgerError::Storage(format!(
            "refusing to finish run {run_id} with non-terminal status '{status}'"
        )))
    }
}
