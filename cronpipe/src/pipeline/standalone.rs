//! Standalone-stage executor.

use tracing::{error, info};
use uuid::Uuid;

use super::{Orchestrator, SkipReason, StandaloneOutcome};
use crate::core::{RunStatus, StageName};
use crate::errors::OrchestratorError;
use crate::events;
use crate::ledger::{NewPipelineRun, RunMetadata};
use crate::registry::JobKind;
use crate::utils::now_utc;

/// Ledger source label of a standalone stage run.
#[must_use]
pub fn standalone_source(stage: StageName) -> String {
    format!("cron/{stage}")
}

/// Runs exactly one stage under that stage's own lock.
#[derive(Debug, Clone)]
pub struct StandaloneStageExecutor {
    orchestrator: Orchestrator,
    split_jobs_enabled: bool,
}

impl StandaloneStageExecutor {
    /// Creates an executor. When `split_jobs_enabled` is false every
    /// invocation is skipped before touching the lock or the ledger.
    #[must_use]
    pub fn new(orchestrator: Orchestrator, split_jobs_enabled: bool) -> Self {
        Self {
            orchestrator,
            split_jobs_enabled,
        }
    }

    /// Whether standalone execution is switched on.
    #[must_use]
    pub const fn split_jobs_enabled(&self) -> bool {
        self.split_jobs_enabled
    }

    /// Runs `stage` once.
    pub async fn run(&self, stage: StageName, trigger: &str) -> StandaloneOutcome {
        if !self.split_jobs_enabled {
            info!(stage = %stage, "Split jobs disabled, skipping");
            return StandaloneOutcome::Skipped(SkipReason::SplitJobsDisabled);
        }

        let schedule = JobKind::Stage(stage).schedule();
        let guard = match self.orchestrator.locks.acquire_for(&schedule).await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                info!(resource = schedule.lock_resource, "Stage already running, skipping");
                self.orchestrator.events.try_emit(
                    events::LOCK_CONTENDED,
                    Some(serde_json::json!({ "resource": schedule.lock_resource })),
                );
                return StandaloneOutcome::Skipped(SkipReason::AlreadyRunning);
            }
            Err(err) => {
                let err = OrchestratorError::from(err);
                error!(resource = schedule.lock_resource, error = %err, "Lock acquisition failed");
                return StandaloneOutcome::Failed {
                    run_id: None,
                    error: err.to_string(),
                };
            }
        };

        let mut run_id = None;
        let outcome = match self.execute(stage, trigger, &mut run_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(stage = %stage, run_id = ?run_id, error = %err, "Standalone run aborted");
                self.orchestrator.recover(run_id, &err).await;
                StandaloneOutcome::Failed {
                    run_id,
                    error: err.to_string(),
                }
            }
        };

        guard.release_logged().await;
        outcome
    }

    async fn execute(
        &self,
        stage: StageName,
        trigger: &str,
        run_id_slot: &mut Option<Uuid>,
    ) -> Result<StandaloneOutcome, OrchestratorError> {
        let orchestrator = &self.orchestrator;
        let source = standalone_source(stage);
        let run = orchestrator
            .ledger
            .insert_run(NewPipelineRun {
                trigger: trigger.to_string(),
                source: source.clone(),
                metadata: RunMetadata::standalone(stage),
                started_at: now_utc(),
            })
            .await?;
        *run_id_slot = Some(run.id);

        info!(run_id = %run.id, stage = %stage, trigger, "Standalone run started");
        orchestrator
            .events
            .emit(
                events::RUN_STARTED,
                Some(serde_json::json!({ "runId": run.id, "source": source, "trigger": trigger })),
            )
            .await;

        let execution = orchestrator.execute_stage(run.id, stage).await?;
        match execution.result {
            Ok(result) => {
                let status = RunStatus::derive(false, result.has_recoverable_errors());
                orchestrator
                    .ledger
                    .finish_run(run.id, status, now_utc(), None)
                    .await?;
                if stage.invalidates_cache() {
                    orchestrator.cache.invalidate();
                }
                orchestrator.emit_run_finished(run.id, status, None).await;

                Ok(StandaloneOutcome::Completed {
                    run_id: run.id,
                    stage,
                    status,
                    duration_ms: execution.record.duration_ms,
                    result,
                })
            }
            Err(err) => {
                orchestrator
                    .ledger
                    .finish_run(run.id, RunStatus::Failed, now_utc(), Some(err.message.clone()))
                    .await?;
                orchestrator
                    .emit_run_finished(run.id, RunStatus::Failed, Some(err.message.as_str()))
                    .await;

                Ok(StandaloneOutcome::Failed {
                    run_id: Some(run.id),
                    error: err.message,
                })
            }
        }
    }
}
