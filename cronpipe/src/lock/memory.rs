//! In-process lock store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::LockStore;
use crate::errors::LockError;

#[derive(Debug, Clone)]
struct LockEntry {
    value: String,
    ttl_secs: u64,
    expires_at: Instant,
}

impl LockEntry {
    fn new(key: &str, value: &str, ttl_secs: u64) -> Result<Self, LockError> {
        let expires_at = Instant::now()
            .checked_add(Duration::from_secs(ttl_secs))
            .ok_or_else(|| LockError::InvalidTtl {
                key: key.to_string(),
            })?;
        Ok(Self {
            value: value.to_string(),
            ttl_secs,
            expires_at,
        })
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Lock store backed by a concurrent map.
///
/// Mutual exclusion only holds within one process. Each primitive runs under
/// the map's per-key shard lock, so set-if-absent and delete-if-equals are
/// atomic with respect to each other.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    entries: DashMap<String, LockEntry>,
}

impl InMemoryLockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// TTL the live entry under `key` was stored with.
    #[must_use]
    pub fn ttl_secs(&self, key: &str) -> Option<u64> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.ttl_secs)
    }

    /// Marks the entry under `key` as expired, as if its TTL had elapsed.
    pub fn force_expire(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Instant::now();
        }
    }

    /// Number of live (unexpired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    /// Returns true if no live entry exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, LockError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(LockEntry::new(key, value, ttl_secs)?);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LockEntry::new(key, value, ttl_secs)?);
                Ok(true)
            }
        }
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, LockError> {
        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.value == value)
            .is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }
}
