//! Distributed, TTL-bounded mutual exclusion.
//!
//! A lock is a single key `lock:<resource>` in a shared store whose value is
//! an ownership token unique to the acquiring call. Acquisition is one atomic
//! set-if-absent-with-expiry; release is one atomic delete-if-value-matches,
//! so a caller whose lock already expired can never delete a newer owner's
//! entry. Locks are never renewed: the TTL must upper-bound the work.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::InMemoryLockStore;
#[cfg(feature = "postgres")]
pub use postgres::PgLockStore;

use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::LockError;
use crate::registry::JobSchedule;
use crate::utils::generate_ownership_token;

/// TTL used when the caller does not pick one.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Prefix shared by every lock key.
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Builds the store key for a resource.
#[must_use]
pub fn lock_key(resource: &str) -> String {
    format!("{LOCK_KEY_PREFIX}{resource}")
}

/// Atomic primitives a lock backend must provide.
///
/// Each method is a single round trip; implementations must never emulate
/// them with separate read and write calls.
#[async_trait]
pub trait LockStore: Send + Sync + Debug {
    /// Stores `value` under `key` with the given expiry, only if the key is
    /// absent (or expired). Returns true if the value was stored.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, LockError>;

    /// Deletes `key` only if its current value equals `value`.
    /// Returns true if an entry was deleted.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, LockError>;

    /// Reads the live value under `key`, for diagnostics.
    async fn get(&self, key: &str) -> Result<Option<String>, LockError>;
}

/// Acquires locks against a [`LockStore`].
#[derive(Debug, Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
}

impl LockManager {
    /// Creates a manager over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    /// Tries to acquire the lock for `resource`.
    ///
    /// Never blocks or retries: `Ok(None)` means another invocation holds
    /// the lock and the caller should report "already running".
    pub async fn acquire(&self, resource: &str, ttl_secs: u64) -> Result<Option<LockGuard>, LockError> {
        let key = lock_key(resource);
        if ttl_secs == 0 {
            return Err(LockError::InvalidTtl { key });
        }

        let token = generate_ownership_token();
        if !self.store.set_if_absent(&key, &token, ttl_secs).await? {
            debug!(key = %key, "lock held by another invocation");
            return Ok(None);
        }

        debug!(key = %key, ttl_secs, "lock acquired");
        Ok(Some(LockGuard {
            store: Arc::clone(&self.store),
            key,
            token,
            ttl_secs,
            released: false,
        }))
    }

    /// Acquires with [`DEFAULT_TTL_SECS`].
    pub async fn acquire_default(&self, resource: &str) -> Result<Option<LockGuard>, LockError> {
        self.acquire(resource, DEFAULT_TTL_SECS).await
    }

    /// Acquires using a registry entry's resource and TTL.
    pub async fn acquire_for(&self, schedule: &JobSchedule) -> Result<Option<LockGuard>, LockError> {
        self.acquire(schedule.lock_resource, schedule.ttl_secs).await
    }

    /// Runs `body` while holding the lock, releasing it afterwards.
    ///
    /// Returns `Ok(None)` without running `body` if the lock is held
    /// elsewhere. A failed release is logged; the TTL reclaims the key.
    pub async fn with_lock<F, Fut, T>(
        &self,
        resource: &str,
        ttl_secs: u64,
        body: F,
    ) -> Result<Option<T>, LockError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
    {
        let Some(guard) = self.acquire(resource, ttl_secs).await? else {
            return Ok(None);
        };

        let value = body().await;
        guard.release_logged().await;
        Ok(Some(value))
    }
}

/// Ownership of an acquired lock.
///
/// Call [`LockGuard::release`] on every exit path. A guard dropped without
/// an explicit release (for example while a panic unwinds) spawns the
/// compare-and-delete on the current Tokio runtime; outside a runtime the
/// entry is left to expire.
#[derive(Debug)]
pub struct LockGuard {
    store: Arc<dyn LockStore>,
    key: String,
    token: String,
    ttl_secs: u64,
    released: bool,
}

impl LockGuard {
    /// The full store key, `lock:<resource>`.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The ownership token written at acquisition.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The TTL the lock was acquired with.
    #[must_use]
    pub const fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Releases the lock if this guard still owns it.
    ///
    /// Returns false when the entry had already expired and possibly been
    /// taken by another owner; that entry is left untouched.
    pub async fn release(mut self) -> Result<bool, LockError> {
        self.released = true;
        let deleted = self.store.delete_if_equals(&self.key, &self.token).await?;
        if deleted {
            debug!(key = %self.key, "lock released");
        } else {
            warn!(key = %self.key, "lock expired before release; newer owner left untouched");
        }
        Ok(deleted)
    }

    /// Releases the lock and logs instead of returning a store error.
    pub async fn release_logged(self) {
        let key = self.key.clone();
        if let Err(err) = self.release().await {
            warn!(key = %key, error = %err, "lock release failed; entry will expire via TTL");
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(key = %key, "lock guard dropped without release; releasing in background");
                handle.spawn(async move {
                    if let Err(err) = store.delete_if_equals(&key, &token).await {
                        warn!(key = %key, error = %err, "background lock release failed");
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "lock guard dropped outside a runtime; entry will expire via TTL");
            }
        }
    }
}
