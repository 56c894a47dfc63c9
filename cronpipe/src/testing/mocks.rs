//! Mock stages and collaborators for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use crate::cache::CacheInvalidator;
use crate::core::StageName;
use crate::errors::{LockError, StageError};
use crate::lock::{InMemoryLockStore, LockStore};
use crate::stages::{Stage, StageResult};

/// A mock stage that records calls and returns a configurable result.
#[derive(Debug)]
pub struct MockStage {
    name: StageName,
    result: Mutex<StageResult>,
    call_count: Mutex<usize>,
}

impl MockStage {
    /// Creates a mock stage returning an empty result.
    #[must_use]
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            result: Mutex::new(StageResult::new()),
            call_count: Mutex::new(0),
        }
    }

    /// Builder-style result override.
    #[must_use]
    pub fn with_result(self, result: StageResult) -> Self {
        *self.result.lock() = result;
        self
    }

    /// Sets the result to return from the next call on.
    pub fn set_result(&self, result: StageResult) {
        *self.result.lock() = result;
    }

    /// Number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Stage for MockStage {
    fn name(&self) -> StageName {
        self.name
    }

    async fn run(&self) -> Result<StageResult, StageError> {
        *self.call_count.lock() += 1;
        Ok(self.result.lock().clone())
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: StageName,
    error: String,
    call_count: AtomicUsize,
}

impl FailingStage {
    /// Creates a stage failing with `error`.
    #[must_use]
    pub fn new(name: StageName, error: impl Into<String>) -> Self {
        Self {
            name,
            error: error.into(),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> StageName {
        self.name
    }

    async fn run(&self) -> Result<StageResult, StageError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Err(StageError::new(self.error.clone()))
    }
}

/// A stage that takes time to execute.
#[derive(Debug)]
pub struct SlowStage {
    name: StageName,
    delay: Duration,
}

impl SlowStage {
    /// Creates a stage sleeping for `delay` before returning.
    #[must_use]
    pub fn new(name: StageName, delay: Duration) -> Self {
        Self { name, delay }
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> StageName {
        self.name
    }

    async fn run(&self) -> Result<StageResult, StageError> {
        tokio::time::sleep(self.delay).await;
        Ok(StageResult::new())
    }
}

/// A stage that parks until the test releases it, to observe state while a
/// run is in progress.
#[derive(Debug)]
pub struct BlockingStage {
    name: StageName,
    entered: Notify,
    release: Notify,
}

impl BlockingStage {
    /// Creates a blocking stage.
    #[must_use]
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Waits until the stage has started running.
    pub async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    /// Lets the running stage return.
    pub fn unblock(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl Stage for BlockingStage {
    fn name(&self) -> StageName {
        self.name
    }

    async fn run(&self) -> Result<StageResult, StageError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(StageResult::new())
    }
}

/// Lock store that counts primitive calls and can be told to fail.
///
/// Delegates to an [`InMemoryLockStore`].
#[derive(Debug, Default)]
pub struct CountingLockStore {
    inner: InMemoryLockStore,
    acquire_calls: AtomicUsize,
    release_calls: AtomicUsize,
    fail_acquire: AtomicBool,
}

impl CountingLockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `set_if_absent` fail with a store error.
    pub fn fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    /// Number of `set_if_absent` calls.
    #[must_use]
    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete_if_equals` calls.
    #[must_use]
    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &InMemoryLockStore {
        &self.inner
    }
}

#[async_trait]
impl LockStore for CountingLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, LockError> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(LockError::store(key, "connection refused"));
        }
        self.inner.set_if_absent(key, value, ttl_secs).await
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, LockError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_if_equals(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        self.inner.get(key).await
    }
}

/// Cache invalidator that counts requests.
#[derive(Debug, Default)]
pub struct CountingCacheInvalidator {
    count: AtomicUsize,
}

impl CountingCacheInvalidator {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invalidations requested.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl CacheInvalidator for CountingCacheInvalidator {
    fn invalidate(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mock_stage() {
        let stage = MockStage::new(StageName::Ingest);
        assert!(stage.run().await.unwrap().as_map().is_empty());

        stage.set_result(StageResult::new().with("inserted", 2));
        let result = stage.run().await.unwrap();
        assert_eq!(result.get("inserted"), Some(&serde_json::json!(2)));
        assert_eq!(stage.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_stage() {
        let stage = FailingStage::new(StageName::Aggregate, "rollup failed");
        assert_eq!(stage.run().await.unwrap_err().message, "rollup failed");
        assert_eq!(stage.call_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_stage() {
        let stage = SlowStage::new(StageName::Analyze, Duration::from_millis(10));
        let start = std::time::Instant::now();
        stage.run().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_blocking_stage() {
        let stage = Arc::new(BlockingStage::new(StageName::Enrich));
        let runner = Arc::clone(&stage);
        let task = tokio::spawn(async move { runner.run().await });

        stage.wait_until_entered().await;
        stage.unblock();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_counting_lock_store() {
        let store = CountingLockStore::new();
        assert!(store.set_if_absent("lock:a", "t1", 10).await.unwrap());
        assert!(!store.set_if_absent("lock:a", "t2", 10).await.unwrap());
        assert!(store.delete_if_equals("lock:a", "t1").await.unwrap());
        assert_eq!(store.acquire_calls(), 2);
        assert_eq!(store.release_calls(), 1);

        store.fail_acquire(true);
        assert!(store.set_if_absent("lock:a", "t3", 10).await.is_err());
        assert!(store.inner().is_empty());
    }

    #[test]
    fn test_counting_cache_invalidator() {
        let cache = CountingCacheInvalidator::new();
        cache.invalidate();
        cache.invalidate();
        assert_eq!(cache.count(), 2);
    }
}
