//! In-memory ledger.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::{ensure_terminal, Ledger, NewPipelineRun, PipelineRun, PipelineStageRun};
use crate::core::{RunStatus, StageName};
use crate::errors::LedgerError;
use crate::utils::{generate_uuid, Timestamp};

#[derive(Debug, Default)]
struct LedgerState {
    /// Runs in insertion order.
    runs: Vec<PipelineRun>,
    stage_runs: HashMap<(Uuid, StageName), PipelineStageRun>,
}

/// Ledger kept in process memory.
///
/// Every operation runs under one mutex, which gives the same
/// single-statement atomicity the SQL backend gets from `ON CONFLICT`.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs recorded.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.state.lock().runs.len()
    }

    /// Number of stage records across all runs.
    #[must_use]
    pub fn stage_run_count(&self) -> usize {
        self.state.lock().stage_runs.len()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn insert_run(&self, run: NewPipelineRun) -> Result<PipelineRun, LedgerError> {
        let row = PipelineRun {
            id: generate_uuid(),
            trigger: run.trigger,
            source: run.source,
            status: RunStatus::Started,
            metadata: run.metadata,
            started_at: run.started_at,
            completed_at: None,
            error: None,
        };
        self.state.lock().runs.push(row.clone());
        Ok(row)
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        completed_at: Timestamp,
        error: Option<String>,
    ) -> Result<(), LedgerError> {
        ensure_terminal(run_id, status)?;

        let mut state = self.state.lock();
        let run = state
            .runs
            .iter_mut()
            .find(|run| run.id == run_id)
            .ok_or(LedgerError::RunNotFound(run_id))?;

        if run.status.is_terminal() {
            return Err(LedgerError::RunFinalized {
                run_id,
                status: run.status.to_string(),
            });
        }

        run.status = status;
        run.completed_at = Some(completed_at);
        run.error = error;
        Ok(())
    }

    async fn upsert_stage_run(&self, record: &PipelineStageRun) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        if !state.runs.iter().any(|run| run.id == record.pipeline_run_id) {
            return Err(LedgerError::RunNotFound(record.pipeline_run_id));
        }
        state
            .stage_runs
            .insert((record.pipeline_run_id, record.stage), record.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<PipelineRun>, LedgerError> {
        Ok(self
            .state
            .lock()
            .runs
            .iter()
            .find(|run| run.id == run_id)
            .cloned())
    }

    async fn stage_runs(&self, run_id: Uuid) -> Result<Vec<PipelineStageRun>, LedgerError> {
        let state = self.state.lock();
        let mut records: Vec<_> = state
            .stage_runs
            .values()
            .filter(|record| record.pipeline_run_id == run_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.stage.position());
        Ok(records)
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<PipelineRun>, LedgerError> {
        Ok(self
            .state
            .lock()
            .runs
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageRunStatus;
    use crate::ledger::RunMetadata;
    use crate::utils::now_utc;

    fn new_run(source: &str) -> NewPipelineRun {
        NewPipelineRun {
            trigger: "cron".to_string(),
            source: source.to_string(),
            metadata: RunMetadata::full_pipeline(),
            started_at: now_utc(),
        }
    }

    #[tokio::test]
    async fn test_insert_run_assigns_id() {
        let ledger = InMemoryLedger::new();
        let a = ledger.insert_run(new_run("cron/pipeline")).await.unwrap();
        let b = ledger.insert_run(new_run("cron/pipeline")).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.status, RunStatus::Started);
        assert!(a.completed_at.is_none());
        assert_eq!(ledger.run_count(), 2);
    }

    #[tokio::test]
    async fn test_finish_run_once() {
        let ledger = InMemoryLedger::new();
        let run = ledger.insert_run(new_run("cron/pipeline")).await.unwrap();

        ledger
            .finish_run(run.id, RunStatus::Failed, now_utc(), Some("boom".into()))
            .await
            .unwrap();

        let stored = ledger.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert!(stored.completed_at.is_some());

        let err = ledger
            .finish_run(run.id, RunStatus::Completed, now_utc(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::RunFinalized { .. }));
    }

    #[tokio::test]
    async fn test_finish_run_rejects_started() {
        let ledger = InMemoryLedger::new();
        let run = ledger.insert_run(new_run("cron/pipeline")).await.unwrap();
        assert!(ledger
            .finish_run(run.id, RunStatus::Started, now_utc(), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_finish_unknown_run() {
        let ledger = InMemoryLedger::new();
        let err = ledger
            .finish_run(Uuid::nil(), RunStatus::Completed, now_utc(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::RunNotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_updates_existing_pair() {
        let ledger = InMemoryLedger::new();
        let run = ledger.insert_run(new_run("cron/pipeline")).await.unwrap();
        let at = now_utc();

        let started = PipelineStageRun::started(run.id, StageName::Ingest, at);
        ledger.upsert_stage_run(&started).await.unwrap();
        ledger
            .upsert_stage_run(&started.complete(serde_json::json!({"inserted": 3}), 15, at))
            .await
            .unwrap();

        assert_eq!(ledger.stage_run_count(), 1);
        let records = ledger.stage_runs(run.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, StageRunStatus::Completed);
        assert_eq!(records[0].duration_ms, 15);
    }

    #[tokio::test]
    async fn test_upsert_requires_run() {
        let ledger = InMemoryLedger::new();
        let record = PipelineStageRun::started(Uuid::nil(), StageName::Ingest, now_utc());
        assert!(matches!(
            ledger.upsert_stage_run(&record).await,
            Err(LedgerError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stage_runs_in_pipeline_order() {
        let ledger = InMemoryLedger::new();
        let run = ledger.insert_run(new_run("cron/pipeline")).await.unwrap();
        let at = now_utc();

        for stage in [StageName::Briefing, StageName::Ingest, StageName::Analyze] {
            ledger
                .upsert_stage_run(&PipelineStageRun::skipped(run.id, stage, at))
                .await
                .unwrap();
        }

        let stages: Vec<_> = ledger
            .stage_runs(run.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.stage)
            .collect();
        assert_eq!(
            stages,
            vec![StageName::Ingest, StageName::Analyze, StageName::Briefing]
        );
    }

    #[tokio::test]
    async fn test_recent_runs_newest_first() {
        let ledger = InMemoryLedger::new();
        let first = ledger.insert_run(new_run("cron/ingest")).await.unwrap();
        let second = ledger.insert_run(new_run("cron/enrich")).await.unwrap();
        let third = ledger.insert_run(new_run("cron/pipeline")).await.unwrap();

        let recent = ledger.recent_runs(2).await.unwrap();
        assert_eq!(
            recent.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![third.id, second.id]
        );
        assert_ne!(recent[1].id, first.id);
    }
}
