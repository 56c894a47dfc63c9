//! Pipeline execution.
//!
//! This module provides:
//! - The full-pipeline executor (all six stages under one lock)
//! - The standalone-stage executor (one stage under its own lock)
//! - Failure propagation and run verdicts
//! - Invocation outcomes consumed by the HTTP layer

mod executor;
mod outcome;
mod propagation;
mod standalone;

pub use executor::{FullPipelineExecutor, PIPELINE_SOURCE};
pub use outcome::{PipelineOutcome, RunReport, SkipReason, StageOutcome, StandaloneOutcome};
pub use propagation::{FailurePropagation, FailureRecord};
pub use standalone::{standalone_source, StandaloneStageExecutor};

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::{CacheInvalidator, NoOpCacheInvalidator};
use crate::core::{RunStatus, StageName};
use crate::errors::{LedgerError, OrchestratorError, StageError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::ledger::{Ledger, PipelineStageRun};
use crate::lock::LockManager;
use crate::stages::{StageRegistry, StageResult};
use crate::utils::{duration_ms, now_utc};

/// Collaborators shared by both executors.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    locks: LockManager,
    ledger: Arc<dyn Ledger>,
    stages: StageRegistry,
    cache: Arc<dyn CacheInvalidator>,
    events: Arc<dyn EventSink>,
}

impl Orchestrator {
    /// Creates an orchestrator with no-op cache and event hooks.
    ///
    /// An incomplete registry is allowed; unregistered stages fail when run.
    #[must_use]
    pub fn new(locks: LockManager, ledger: Arc<dyn Ledger>, stages: StageRegistry) -> Self {
        if !stages.is_complete() {
            warn!(missing = ?stages.missing(), "Stages not registered; they will fail when run");
        }

        Self {
            locks,
            ledger,
            stages,
            cache: Arc::new(NoOpCacheInvalidator),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the cache invalidator.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Lock manager.
    #[must_use]
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Run ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Registered stages.
    #[must_use]
    pub fn stages(&self) -> &StageRegistry {
        &self.stages
    }

    /// Runs one stage inside an open run: pre-registers it as `started`,
    /// invokes it and writes its terminal record.
    ///
    /// Stage failures (including panics and missing registrations) are
    /// returned inside [`StageExecution`]; only ledger failures are errors.
    async fn execute_stage(
        &self,
        run_id: Uuid,
        stage: StageName,
    ) -> Result<StageExecution, LedgerError> {
        let started = PipelineStageRun::started(run_id, stage, now_utc());
        self.ledger.upsert_stage_run(&started).await?;
        self.events.try_emit(
            events::STAGE_STARTED,
            Some(serde_json::json!({ "runId": run_id, "stage": stage })),
        );

        let start = Instant::now();
        let result = self.invoke(stage).await;
        let elapsed = duration_ms(start.elapsed());

        let record = match &result {
            Ok(output) => {
                info!(run_id = %run_id, stage = %stage, duration_ms = elapsed, "Stage completed");
                self.events.try_emit(
                    events::STAGE_COMPLETED,
                    Some(serde_json::json!({
                        "runId": run_id,
                        "stage": stage,
                        "durationMs": elapsed,
                        "recoverableErrors": output.recoverable_errors().len(),
                    })),
                );
                started.complete(output.to_value(), elapsed, now_utc())
            }
            Err(err) => {
                error!(run_id = %run_id, stage = %stage, duration_ms = elapsed, error = %err, "Stage failed");
                self.events.try_emit(
                    events::STAGE_FAILED,
                    Some(serde_json::json!({
                        "runId": run_id,
                        "stage": stage,
                        "durationMs": elapsed,
                        "error": err.message,
                    })),
                );
                started.fail(err.message.clone(), elapsed, now_utc())
            }
        };

        self.ledger.upsert_stage_run(&record).await?;
        Ok(StageExecution { record, result })
    }

    async fn invoke(&self, stage: StageName) -> Result<StageResult, StageError> {
        let Some(implementation) = self.stages.get(stage) else {
            return Err(StageError::not_registered(stage));
        };

        match AssertUnwindSafe(implementation.run()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(StageError::panicked(stage, &panic_message(payload.as_ref()))),
        }
    }

    /// Marks a run failed after the orchestrator itself errored.
    async fn recover(&self, run_id: Option<Uuid>, err: &OrchestratorError) {
        let Some(run_id) = run_id else {
            return;
        };

        let message = err.to_string();
        match self
            .ledger
            .finish_run(run_id, RunStatus::Failed, now_utc(), Some(message.clone()))
            .await
        {
            Ok(()) => {
                self.emit_run_finished(run_id, RunStatus::Failed, Some(message.as_str()))
                    .await;
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Could not mark run as failed");
            }
        }
    }

    async fn emit_run_finished(&self, run_id: Uuid, status: RunStatus, error: Option<&str>) {
        self.events
            .emit(
                events::RUN_FINISHED,
                Some(serde_json::json!({ "runId": run_id, "status": status, "error": error })),
            )
            .await;
    }
}

/// A stage's terminal ledger record and what it returned.
#[derive(Debug)]
struct StageExecution {
    record: PipelineStageRun,
    result: Result<StageResult, StageError>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageRunStatus;
    use crate::ledger::{InMemoryLedger, NewPipelineRun, RunMetadata};
    use crate::lock::InMemoryLockStore;
    use crate::stages::FnStage;

    async fn open_run(ledger: &InMemoryLedger) -> Uuid {
        ledger
            .insert_run(NewPipelineRun {
                trigger: "cron".into(),
                source: "cron/pipeline".into(),
                metadata: RunMetadata::full_pipeline(),
                started_at: now_utc(),
            })
            .await
            .unwrap()
            .id
    }

    fn orchestrator(ledger: Arc<InMemoryLedger>, stages: StageRegistry) -> Orchestrator {
        Orchestrator::new(
            LockManager::new(Arc::new(InMemoryLockStore::new())),
            ledger,
            stages,
        )
    }

    #[tokio::test]
    async fn test_missing_stage_fails() {
        let ledger = Arc::new(InMemoryLedger::new());
        let run_id = open_run(&ledger).await;
        let orchestrator = orchestrator(Arc::clone(&ledger), StageRegistry::new());

        let execution = orchestrator
            .execute_stage(run_id, StageName::Analyze)
            .await
            .unwrap();

        assert_eq!(execution.record.status, StageRunStatus::Failed);
        assert_eq!(
            execution.record.error.as_deref(),
            Some("no stage registered for 'analyze'")
        );
    }

    #[tokio::test]
    async fn test_panicking_stage_becomes_failure() {
        let ledger = Arc::new(InMemoryLedger::new());
        let run_id = open_run(&ledger).await;
        let stages = StageRegistry::new().with(Arc::new(FnStage::new(StageName::Ingest, || async {
            if true {
                panic!("feed exploded");
            }
            Ok::<_, StageError>(StageResult::new())
        })));
        let orchestrator = orchestrator(Arc::clone(&ledger), stages);

        let execution = orchestrator
            .execute_stage(run_id, StageName::Ingest)
            .await
            .unwrap();

        assert!(execution.result.is_err());
        assert_eq!(execution.record.status, StageRunStatus::Failed);
        assert!(execution
            .record
            .error
            .as_deref()
            .unwrap()
            .contains("feed exploded"));
        assert_eq!(ledger.stage_run_count(), 1);
    }

    #[tokio::test]
    async fn test_recover_without_run_is_noop() {
        let ledger = Arc::new(InMemoryLedger::new());
        let orchestrator = orchestrator(Arc::clone(&ledger), StageRegistry::new());
        orchestrator
            .recover(None, &OrchestratorError::Internal("boom".into()))
            .await;
        assert_eq!(ledger.run_count(), 0);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
