//! Dependency-aware failure propagation over the linear stage chain.

use crate::core::{RunStatus, StageName};
use crate::errors::StageError;
use crate::stages::StageResult;

/// A stage failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Stage that failed.
    pub stage: StageName,
    /// Error message.
    pub error: String,
}

/// Tracks the dependency-failed and recoverable-errors flags of one run.
///
/// Every stage depends on all earlier stages, so a single failure means
/// every later stage is skipped.
#[derive(Debug, Default)]
pub struct FailurePropagation {
    first_failure: Option<FailureRecord>,
    recoverable: Vec<StageName>,
    completed: Vec<StageName>,
    skipped: Vec<StageName>,
}

impl FailurePropagation {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful stage and whether it reported recoverable errors.
    pub fn record_completion(&mut self, stage: StageName, result: &StageResult) {
        if result.has_recoverable_errors() {
            self.recoverable.push(stage);
        }
        self.completed.push(stage);
    }

    /// Records a fatal stage failure and sets the dependency-failed flag.
    pub fn record_failure(&mut self, stage: StageName, error: &StageError) {
        if self.first_failure.is_none() {
            self.first_failure = Some(FailureRecord {
                stage,
                error: error.message.clone(),
            });
        }
    }

    /// Records a stage skipped because of an upstream failure.
    pub fn record_skip(&mut self, stage: StageName) {
        self.skipped.push(stage);
    }

    /// True once any stage has failed; later stages must be skipped.
    #[must_use]
    pub fn should_skip(&self) -> bool {
        self.first_failure.is_some()
    }

    /// True if any completed stage reported recoverable errors.
    #[must_use]
    pub fn had_recoverable_errors(&self) -> bool {
        !self.recoverable.is_empty()
    }

    /// The first failure, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<&FailureRecord> {
        self.first_failure.as_ref()
    }

    /// Stages that completed, in execution order.
    #[must_use]
    pub fn completed(&self) -> &[StageName] {
        &self.completed
    }

    /// Stages that were skipped, in order.
    #[must_use]
    pub fn skipped(&self) -> &[StageName] {
        &self.skipped
    }

    /// Final verdict for the run.
    #[must_use]
    pub fn run_status(&self) -> RunStatus {
        RunStatus::derive(self.should_skip(), self.had_recoverable_errors())
    }

    /// Error message to store on the run, present only when it failed.
    #[must_use]
    pub fn run_error(&self) -> Option<String> {
        self.first_failure.as_ref().map(|failure| failure.error.clone())
    }
}
