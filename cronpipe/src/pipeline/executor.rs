//! Full-pipeline executor.

use tracing::{error, info};
use uuid::Uuid;

use super::{FailurePropagation, Orchestrator, PipelineOutcome, RunReport, SkipReason, StageOutcome};
use crate::core::StageName;
use crate::errors::OrchestratorError;
use crate::events;
use crate::ledger::{NewPipelineRun, PipelineStageRun, RunMetadata};
use crate::registry::JobKind;
use crate::utils::now_utc;

/// Ledger source label of full-pipeline runs.
pub const PIPELINE_SOURCE: &str = "cron/pipeline";

/// Runs all six stages in order under the `pipeline` lock.
#[derive(Debug, Clone)]
pub struct FullPipelineExecutor {
    orchestrator: Orchestrator,
}

/// State accumulated while the run body executes, kept for the recovery path.
#[derive(Debug, Default)]
struct RunProgress {
    run_id: Option<Uuid>,
    stages: Vec<StageOutcome>,
}

impl FullPipelineExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Shared collaborators.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Runs one full-pipeline invocation.
    ///
    /// Never panics on stage or storage failure; the lock is released on
    /// every path that acquired it.
    pub async fn run(&self, trigger: &str) -> PipelineOutcome {
        let schedule = JobKind::FullPipeline.schedule();
        let guard = match self.orchestrator.locks.acquire_for(&schedule).await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                info!(resource = schedule.lock_resource, "Pipeline already running, skipping");
                self.orchestrator.events.try_emit(
                    events::LOCK_CONTENDED,
                    Some(serde_json::json!({ "resource": schedule.lock_resource })),
                );
                return PipelineOutcome::Skipped(SkipReason::AlreadyRunning);
            }
            Err(err) => {
                let err = OrchestratorError::from(err);
                error!(resource = schedule.lock_resource, error = %err, "Lock acquisition failed");
                return PipelineOutcome::Errored {
                    run_id: None,
                    error: err.to_string(),
                    stages: Vec::new(),
                };
            }
        };

        let mut progress = RunProgress::default();
        let outcome = match self.execute(trigger, &mut progress).await {
            Ok(report) => PipelineOutcome::Finished(report),
            Err(err) => {
                error!(run_id = ?progress.run_id, error = %err, "Pipeline run aborted");
                self.orchestrator.recover(progress.run_id, &err).await;
                PipelineOutcome::Errored {
                    run_id: progress.run_id,
                    error: err.to_string(),
                    stages: progress.stages,
                }
            }
        };

        guard.release_logged().await;
        outcome
    }

    async fn execute(
        &self,
        trigger: &str,
        progress: &mut RunProgress,
    ) -> Result<RunReport, OrchestratorError> {
        let orchestrator = &self.orchestrator;
        let run = orchestrator
            .ledger
            .insert_run(NewPipelineRun {
                trigger: trigger.to_string(),
                source: PIPELINE_SOURCE.to_string(),
                metadata: RunMetadata::full_pipeline(),
                started_at: now_utc(),
            })
            .await?;
        progress.run_id = Some(run.id);

        info!(run_id = %run.id, trigger, "Pipeline run started");
        orchestrator
            .events
            .emit(
                events::RUN_STARTED,
                Some(serde_json::json!({
                    "runId": run.id,
                    "source": PIPELINE_SOURCE,
                    "trigger": trigger,
                })),
            )
            .await;

        let mut propagation = FailurePropagation::new();
        for stage in StageName::PIPELINE_ORDER {
            if propagation.should_skip() {
                let record = PipelineStageRun::skipped(run.id, stage, now_utc());
                orchestrator.ledger.upsert_stage_run(&record).await?;
                propagation.record_skip(stage);
                orchestrator.events.try_emit(
                    events::STAGE_SKIPPED,
                    Some(serde_json::json!({ "runId": run.id, "stage": stage })),
                );
                progress.stages.push(StageOutcome::from(&record));
                continue;
            }

            let execution = orchestrator.execute_stage(run.id, stage).await?;
            match &execution.result {
                Ok(result) => propagation.record_completion(stage, result),
                Err(err) => propagation.record_failure(stage, err),
            }
            progress.stages.push(StageOutcome::from(&execution.record));
        }

        orchestrator.cache.invalidate();

        let status = propagation.run_status();
        let error = propagation.run_error();
        orchestrator
            .ledger
            .finish_run(run.id, status, now_utc(), error.clone())
            .await?;

        info!(
            run_id = %run.id,
            status = %status,
            completed = propagation.completed().len(),
            skipped = propagation.skipped().len(),
            "Pipeline run finished"
        );
        orchestrator
            .emit_run_finished(run.id, status, error.as_deref())
            .await;

        Ok(RunReport {
            run_id: run.id,
            status,
            stages: std::mem::take(&mut progress.stages),
            error,
        })
    }
}
