//! Stage names and run/stage status enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One named stage of the fixed pipeline sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Pull raw items from upstream sources.
    Ingest,
    /// Annotate ingested items.
    Enrich,
    /// Score and analyze enriched items.
    Analyze,
    /// Roll item-level analysis up into aggregates.
    Aggregate,
    /// Detect coordinated activity across aggregates.
    Coordination,
    /// Generate briefings from the analyzed state.
    Briefing,
}

impl StageName {
    /// The full pipeline order. Later stages depend on the committed
    /// effects of earlier ones.
    pub const PIPELINE_ORDER: [Self; 6] = [
        Self::Ingest,
        Self::Enrich,
        Self::Analyze,
        Self::Aggregate,
        Self::Coordination,
        Self::Briefing,
    ];

    /// Returns the stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Enrich => "enrich",
            Self::Analyze => "analyze",
            Self::Aggregate => "aggregate",
            Self::Coordination => "coordination",
            Self::Briefing => "briefing",
        }
    }

    /// Position of the stage in [`Self::PIPELINE_ORDER`].
    #[must_use]
    pub const fn position(self) -> usize {
        match self {
            Self::Ingest => 0,
            Self::Enrich => 1,
            Self::Analyze => 2,
            Self::Aggregate => 3,
            Self::Coordination => 4,
            Self::Briefing => 5,
        }
    }

    /// Whether a standalone run of this stage should invalidate read caches.
    ///
    /// Briefing output is not part of any cached read surface.
    #[must_use]
    pub const fn invalidates_cache(self) -> bool {
        !matches!(self, Self::Briefing)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage: {0}")]
pub struct UnknownStage(pub String);

impl FromStr for StageName {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PIPELINE_ORDER
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run row exists and stages are executing.
    Started,
    /// Every stage completed without recoverable errors.
    Completed,
    /// Every stage completed, at least one reported recoverable errors.
    CompletedWithErrors,
    /// A stage failed or the orchestrator itself failed.
    Failed,
}

impl RunStatus {
    /// Returns the stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
        }
    }

    /// Returns true once no further writes may occur.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Started)
    }

    /// Derives the overall verdict from the two per-run flags.
    ///
    /// A fatal stage failure dominates recoverable errors.
    #[must_use]
    pub const fn derive(dependency_failed: bool, had_recoverable_errors: bool) -> Self {
        if dependency_failed {
            Self::Failed
        } else if had_recoverable_errors {
            Self::CompletedWithErrors
        } else {
            Self::Completed
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "completed_with_errors" => Ok(Self::CompletedWithErrors),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Status of one stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRunStatus {
    /// Pre-registered, stage logic is executing.
    Started,
    /// Stage returned a result.
    Completed,
    /// Stage returned an error or panicked.
    Failed,
    /// Stage was not invoked because an earlier stage failed.
    Skipped,
}

impl StageRunStatus {
    /// Returns the stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Started)
    }
}

impl fmt::Display for StageRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown stage status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_order() {
        let names: Vec<_> = StageName::PIPELINE_ORDER.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["ingest", "enrich", "analyze", "aggregate", "coordination", "briefing"]
        );
        for (idx, stage) in StageName::PIPELINE_ORDER.iter().enumerate() {
            assert_eq!(stage.position(), idx);
        }
    }

    #[test]
    fn test_stage_name_parse() {
        assert_eq!("coordination".parse::<StageName>(), Ok(StageName::Coordination));
        assert!("pipeline".parse::<StageName>().is_err());
    }

    #[test]
    fn test_briefing_skips_cache_invalidation() {
        assert!(!StageName::Briefing.invalidates_cache());
        assert!(StageName::Ingest.invalidates_cache());
    }

    #[test]
    fn test_run_status_derive() {
        assert_eq!(RunStatus::derive(false, false), RunStatus::Completed);
        assert_eq!(RunStatus::derive(false, true), RunStatus::CompletedWithErrors);
        assert_eq!(RunStatus::derive(true, false), RunStatus::Failed);
        assert_eq!(RunStatus::derive(true, true), RunStatus::Failed);
    }

    #[test]
    fn test_run_status_serialize() {
        let json = serde_json::to_string(&RunStatus::CompletedWithErrors).unwrap();
        assert_eq!(json, r#""completed_with_errors""#);
        assert_eq!("failed".parse::<RunStatus>(), Ok(RunStatus::Failed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunStatus::Started.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!StageRunStatus::Started.is_terminal());
        assert!(StageRunStatus::Skipped.is_terminal());
    }
}
