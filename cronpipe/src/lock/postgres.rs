//! Postgres-backed lock store.
//!
//! Locks live in `orchestrator_locks`. Acquisition is one upsert that only
//! overwrites an expired row; release is one conditional delete.

use async_trait::async_trait;
use sqlx::PgPool;

use super::LockStore;
use crate::errors::LockError;

/// Lock store shared by every process connected to the same database.
#[derive(Debug, Clone)]
pub struct PgLockStore {
    pool: PgPool,
}

impl PgLockStore {
    /// Creates a store over an existing pool. Tables come from the crate's
    /// migrations (see [`crate::ledger::PgLedger::migrate`]).
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, LockError> {
        let ttl = i64::try_from(ttl_secs).map_err(|_| LockError::InvalidTtl {
            key: key.to_string(),
        })?;

        let row: Option<(String,)> = sqlx::query_as(
            "INSERT INTO orchestrator_locks (key, token, ttl_secs, expires_at)
             VALUES ($1, $2, $3, now() + ($3 * interval '1 second'))
             ON CONFLICT (key) DO UPDATE
                 SET token = EXCLUDED.token,
                     ttl_secs = EXCLUDED.ttl_secs,
                     expires_at = EXCLUDED.expires_at
                 WHERE orchestrator_locks.expires_at <= now()
             RETURNING key",
        )
        .bind(key)
        .bind(value)
        .bind(ttl)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LockError::store(key, e.to_string()))?;

        Ok(row.is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, LockError> {
        let result = sqlx::query("DELETE FROM orchestrator_locks WHERE key = $1 AND token = $2")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| LockError::store(key, e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        sqlx::query_scalar("SELECT token FROM orchestrator_locks WHERE key = $1 AND expires_at > now()")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LockError::store(key, e.to_string()))
    }
}
