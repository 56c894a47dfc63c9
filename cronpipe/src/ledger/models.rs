//! Ledger records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{RunStatus, StageName, StageRunStatus};
use crate::utils::Timestamp;

/// Reason recorded on stages skipped after an earlier failure.
pub const UPSTREAM_FAILED_REASON: &str = "upstream stage failed";

/// Free-form run metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Stages this run intends to execute, in order.
    pub stages: Vec<StageName>,
    /// True when the run executes a single stage outside the full pipeline.
    #[serde(default)]
    pub standalone: bool,
}

impl RunMetadata {
    /// Metadata for a full-pipeline run.
    #[must_use]
    pub fn full_pipeline() -> Self {
        Self {
            stages: StageName::PIPELINE_ORDER.to_vec(),
            standalone: false,
        }
    }

    /// Metadata for a standalone single-stage run.
    #[must_use]
    pub fn standalone(stage: StageName) -> Self {
        Self {
            stages: vec![stage],
            standalone: true,
        }
    }
}

/// Values supplied when opening a run. The ledger assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPipelineRun {
    /// Trigger origin, e.g. `cron` or `manual`.
    pub trigger: String,
    /// Entrypoint that created the run.
    pub source: String,
    /// Intended stages and run mode.
    pub metadata: RunMetadata,
    /// When the invocation started.
    pub started_at: Timestamp,
}

/// One invocation of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    /// Opaque identifier generated on insert.
    pub id: Uuid,
    /// Trigger origin.
    pub trigger: String,
    /// Entrypoint label.
    pub source: String,
    /// Current status.
    pub status: RunStatus,
    /// Intended stages and run mode.
    pub metadata: RunMetadata,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run reached a terminal status.
    pub completed_at: Option<Timestamp>,
    /// Failure message, when failed.
    pub error: Option<String>,
}

/// One stage's execution record within a run.
///
/// `(pipeline_run_id, stage)` is unique in every ledger backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStageRun {
    /// Owning run.
    pub pipeline_run_id: Uuid,
    /// Stage name.
    pub stage: StageName,
    /// Current status.
    pub status: StageRunStatus,
    /// When the stage started (or was skipped).
    pub started_at: Timestamp,
    /// When the stage reached a terminal status.
    pub completed_at: Option<Timestamp>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: i64,
    /// Stage-defined result payload.
    pub result: Option<serde_json::Value>,
    /// Error message, or skip reason.
    pub error: Option<String>,
}

impl PipelineStageRun {
    /// A pre-registered record for a stage about to execute.
    #[must_use]
    pub fn started(pipeline_run_id: Uuid, stage: StageName, started_at: Timestamp) -> Self {
        Self {
            pipeline_run_id,
            stage,
            status: StageRunStatus::Started,
            started_at,
            completed_at: None,
            duration_ms: 0,
            result: None,
            error: None,
        }
    }

    /// A terminal record for a stage skipped after an upstream failure.
    #[must_use]
    pub fn skipped(pipeline_run_id: Uuid, stage: StageName, at: Timestamp) -> Self {
        Self {
            pipeline_run_id,
            stage,
            status: StageRunStatus::Skipped,
            started_at: at,
            completed_at: Some(at),
            duration_ms: 0,
            result: None,
            error: Some(UPSTREAM_FAILED_REASON.to_string()),
        }
    }

    /// Transitions to `completed`.
    #[must_use]
    pub fn complete(mut self, result: serde_json::Value, duration_ms: i64, at: Timestamp) -> Self {
        self.status = StageRunStatus::Completed;
        self.completed_at = Some(at);
        self.duration_ms = duration_ms;
        self.result = Some(result);
        self.error = None;
        self
    }

    /// Transitions to `failed`.
    #[must_use]
    pub fn fail(mut self, error: impl Into<String>, duration_ms: i64, at: Timestamp) -> Self {
        self.status = StageRunStatus::Failed;
        self.completed_at = Some(at);
        self.duration_ms = duration_ms;
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::now_utc;

    #[test]
    fn test_full_pipeline_metadata() {
        let meta = RunMetadata::full_pipeline();
        assert_eq!(meta.stages.len(), 6);
        assert!(!meta.standalone);
        assert_eq!(
            serde_json::to_value(&meta).unwrap()["stages"][0],
            serde_json::json!("ingest")
        );
    }

    #[test]
    fn test_standalone_metadata() {
        let meta = RunMetadata::standalone(StageName::Briefing);
        assert_eq!(meta.stages, vec![StageName::Briefing]);
        assert!(meta.standalone);
    }

    #[test]
    fn test_skipped_record() {
        let record = PipelineStageRun::skipped(Uuid::nil(), StageName::Aggregate, now_utc());
        assert_eq!(record.status, StageRunStatus::Skipped);
        assert_eq!(record.duration_ms, 0);
        assert_eq!(record.error.as_deref(), Some(UPSTREAM_FAILED_REASON));
    }

    #[test]
    fn test_started_then_failed() {
        let at = now_utc();
        let record = PipelineStageRun::started(Uuid::nil(), StageName::Enrich, at).fail("boom", 42, at);
        assert_eq!(record.status, StageRunStatus::Failed);
        assert_eq!(record.duration_ms, 42);
        assert_eq!(record.completed_at, Some(at));
        assert!(record.result.is_none());
    }
}
