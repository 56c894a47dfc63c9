//! Testing utilities for the orchestrator.
//!
//! This module provides:
//! - Mock stages (recording, failing, slow, blocking)
//! - Counting lock store and cache invalidator doubles
//! - A harness wiring executors to in-memory collaborators

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_skipped_from, assert_stage_statuses};
pub use fixtures::{noop_registry, TestHarness};
pub use mocks::{
    BlockingStage, CountingCacheInvalidator, CountingLockStore, FailingStage, MockStage, SlowStage,
};
