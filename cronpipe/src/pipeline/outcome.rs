//! Invocation outcomes returned by the executors.

use serde::Serialize;
use uuid::Uuid;

use crate::core::{RunStatus, StageName, StageRunStatus};
use crate::ledger::PipelineStageRun;
use crate::stages::StageResult;

/// Why an invocation returned without running anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The job's lock is held by another invocation.
    AlreadyRunning,
    /// Standalone stage endpoints are switched off.
    SplitJobsDisabled,
}

impl SkipReason {
    /// Reason string reported to the scheduler.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyRunning => "already running",
            Self::SplitJobsDisabled => "split_jobs_disabled",
        }
    }
}

/// One stage's entry in a run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    /// Stage name.
    pub stage: StageName,
    /// Terminal stage status.
    pub status: StageRunStatus,
    /// Wall-clock duration; zero for skipped stages.
    pub duration_ms: i64,
    /// Result payload, for completed stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error message or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PipelineStageRun> for StageOutcome {
    fn from(record: &PipelineStageRun) -> Self {
        Self {
            stage: record.stage,
            status: record.status,
            duration_ms: record.duration_ms,
            result: record.result.clone(),
            error: record.error.clone(),
        }
    }
}

/// A full-pipeline run that reached a verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Ledger id of the run.
    pub run_id: Uuid,
    /// Final run status.
    pub status: RunStatus,
    /// Per-stage outcomes in pipeline order.
    pub stages: Vec<StageOutcome>,
    /// First failed stage's error, when the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a full-pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Nothing ran.
    Skipped(SkipReason),
    /// Every stage was executed or skipped and the run was finalized.
    Finished(RunReport),
    /// The orchestrator itself failed. The run, if one was opened, is marked
    /// failed.
    Errored {
        /// Run id, if the run row was created.
        run_id: Option<Uuid>,
        /// Failure message.
        error: String,
        /// Stages that reached a terminal state before the failure.
        stages: Vec<StageOutcome>,
    },
}

/// Result of a standalone single-stage invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum StandaloneOutcome {
    /// Nothing ran.
    Skipped(SkipReason),
    /// The stage returned a result.
    Completed {
        /// Ledger id of the run.
        run_id: Uuid,
        /// Stage that ran.
        stage: StageName,
        /// Run status: `completed` or `completed_with_errors`.
        status: RunStatus,
        /// Wall-clock duration.
        duration_ms: i64,
        /// The stage's result.
        result: StageResult,
    },
    /// The stage or the orchestrator failed.
    Failed {
        /// Run id, if the run row was created.
        run_id: Option<Uuid>,
        /// Failure message.
        error: String,
    },
}
