//! Assertions over run reports.

use crate::core::StageRunStatus;
use crate::pipeline::StageOutcome;

/// Asserts the per-stage statuses of a report, in order.
pub fn assert_stage_statuses(stages: &[StageOutcome], expected: &[StageRunStatus]) {
    let actual: Vec<_> = stages.iter().map(|s| s.status).collect();
    assert_eq!(
        actual, expected,
        "Expected stage statuses {:?}, got {:?}",
        expected, actual
    );
}

/// Asserts every stage from `from` onwards was skipped with zero duration.
pub fn assert_skipped_from(stages: &[StageOutcome], from: usize) {
    for outcome in &stages[from..] {
        assert_eq!(
            outcome.status,
            StageRunStatus::Skipped,
            "Expected '{}' to be skipped, got {:?}",
            outcome.stage,
            outcome.status
        );
        assert_eq!(outcome.duration_ms, 0, "Skipped '{}' has a duration", outcome.stage);
    }
}
