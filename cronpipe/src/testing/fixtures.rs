//! Test fixtures wiring executors to in-memory collaborators.

use std::sync::Arc;

use super::{CountingCacheInvalidator, CountingLockStore};
use crate::core::StageName;
use crate::events::CollectingEventSink;
use crate::ledger::InMemoryLedger;
use crate::lock::LockManager;
use crate::pipeline::{FullPipelineExecutor, Orchestrator, StandaloneStageExecutor};
use crate::stages::{NoOpStage, Stage, StageRegistry};

/// A registry with a [`NoOpStage`] for every pipeline stage.
#[must_use]
pub fn noop_registry() -> StageRegistry {
    StageName::PIPELINE_ORDER
        .into_iter()
        .fold(StageRegistry::new(), |registry, stage| {
            registry.with(Arc::new(NoOpStage::new(stage)))
        })
}

/// An orchestrator over in-memory collaborators, with handles to inspect them.
#[derive(Debug, Clone)]
pub struct TestHarness {
    /// Run ledger.
    pub ledger: Arc<InMemoryLedger>,
    /// Lock store.
    pub locks: Arc<CountingLockStore>,
    /// Cache invalidator.
    pub cache: Arc<CountingCacheInvalidator>,
    /// Event sink.
    pub events: Arc<CollectingEventSink>,
    /// The wired orchestrator.
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    /// Wires `stages` to fresh in-memory collaborators.
    #[must_use]
    pub fn new(stages: StageRegistry) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let locks = Arc::new(CountingLockStore::new());
        let cache = Arc::new(CountingCacheInvalidator::new());
        let events = Arc::new(CollectingEventSink::new());

        let orchestrator = Orchestrator::new(
            LockManager::new(locks.clone()),
            ledger.clone(),
            stages,
        )
        .with_cache(cache.clone())
        .with_events(events.clone());

        Self {
            ledger,
            locks,
            cache,
            events,
            orchestrator,
        }
    }

    /// Harness over [`noop_registry`] with `overrides` registered on top.
    #[must_use]
    pub fn with_overrides(overrides: Vec<Arc<dyn Stage>>) -> Self {
        let stages = overrides
            .into_iter()
            .fold(noop_registry(), |registry, stage| registry.with(stage));
        Self::new(stages)
    }

    /// Full-pipeline executor over this harness.
    #[must_use]
    pub fn pipeline(&self) -> FullPipelineExecutor {
        FullPipelineExecutor::new(self.orchestrator.clone())
    }

    /// Standalone executor over this harness.
    #[must_use]
    pub fn standalone(&self, split_jobs_enabled: bool) -> StandaloneStageExecutor {
        StandaloneStageExecutor::new(self.orchestrator.clone(), split_jobs_enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineOutcome;
    use crate::testing::MockStage;

    #[test]
    fn test_noop_registry_is_complete() {
        assert!(noop_registry().is_complete());
    }

    #[tokio::test]
    async fn test_harness_runs_pipeline() {
        let ingest = Arc::new(MockStage::new(StageName::Ingest));
        let harness = TestHarness::with_overrides(vec![ingest.clone() as Arc<dyn Stage>]);

        let outcome = harness.pipeline().run("cron").await;

        assert!(matches!(outcome, PipelineOutcome::Finished(_)));
        assert_eq!(ingest.call_count(), 1);
        assert_eq!(harness.locks.release_calls(), 1);
        assert_eq!(harness.ledger.stage_run_count(), 6);
    }
}
