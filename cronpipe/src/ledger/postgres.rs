//! Postgres ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{ensure_terminal, Ledger, NewPipelineRun, PipelineRun, PipelineStageRun, RunMetadata};
use crate::core::{RunStatus, StageName, StageRunStatus};
use crate::errors::LedgerError;
use crate::utils::Timestamp;

type RunRow = (
    Uuid,
    String,
    String,
    String,
    serde_json::Value,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
);

type StageRow = (
    Uuid,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    i64,
    Option<serde_json::Value>,
    Option<String>,
);

const RUN_COLUMNS: &str =
    "id, trigger, source, status, metadata, started_at, completed_at, error";

/// Ledger stored in the `pipeline_runs` and `pipeline_stage_runs` tables.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Creates a ledger over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool.
    pub async fn connect(database_url: &str) -> Result<PgPool, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(storage)?;

        info!("Connected to PostgreSQL");
        Ok(pool)
    }

    /// Applies the ledger and lock table migrations.
    pub async fn migrate(pool: &PgPool) -> Result<(), LedgerError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }
}

fn storage(err: sqlx::Error) -> LedgerError {
    LedgerError::Storage(err.to_string())
}

fn decode_run(row: RunRow) -> Result<PipelineRun, LedgerError> {
    let (id, trigger, source, status, metadata, started_at, completed_at, error) = row;
    let metadata: RunMetadata =
        serde_json::from_value(metadata).map_err(|e| LedgerError::Decode(e.to_string()))?;

    Ok(PipelineRun {
        id,
        trigger,
        source,
        status: status.parse().map_err(LedgerError::Decode)?,
        metadata,
        started_at,
        completed_at,
        error,
    })
}

fn decode_stage(row: StageRow) -> Result<PipelineStageRun, LedgerError> {
    let (pipeline_run_id, stage, status, started_at, completed_at, duration_ms, result, error) = row;

    Ok(PipelineStageRun {
        pipeline_run_id,
        stage: stage
            .parse::<StageName>()
            .map_err(|e| LedgerError::Decode(e.to_string()))?,
        status: status
            .parse::<StageRunStatus>()
            .map_err(LedgerError::Decode)?,
        started_at,
        completed_at,
        duration_ms,
        result,
        error,
    })
}

#[async_trait]
impl Ledger for PgLedger {
    async fn insert_run(&self, run: NewPipelineRun) -> Result<PipelineRun, LedgerError> {
        let metadata =
            serde_json::to_value(&run.metadata).map_err(|e| LedgerError::Decode(e.to_string()))?;

        let row: RunRow = sqlx::query_as(&format!(
            "INSERT INTO pipeline_runs (trigger, source, status, metadata, started_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {RUN_COLUMNS}"
        ))
        .bind(&run.trigger)
        .bind(&run.source)
        .bind(RunStatus::Started.as_str())
        .bind(metadata)
        .bind(run.started_at)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        decode_run(row)
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        completed_at: Timestamp,
        error: Option<String>,
    ) -> Result<(), LedgerError> {
        ensure_terminal(run_id, status)?;

        let result = sqlx::query(
            "UPDATE pipeline_runs
             SET status = $2, completed_at = $3, error = $4
             WHERE id = $1 AND status = 'started'",
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(completed_at)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let existing: Option<String> =
            sqlx::query_scalar("SELECT status FROM pipeline_runs WHERE id = $1")
                .bind(run_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        Err(match existing {
            Some(status) => LedgerError::RunFinalized { run_id, status },
            None => LedgerError::RunNotFound(run_id),
        })
    }

    async fn upsert_stage_run(&self, record: &PipelineStageRun) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO pipeline_stage_runs
                 (pipeline_run_id, stage, status, started_at, completed_at, duration_ms, result, error)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (pipeline_run_id, stage) DO UPDATE SET
                 status = EXCLUDED.status,
                 started_at = EXCLUDED.started_at,
                 completed_at = EXCLUDED.completed_at,
                 duration_ms = EXCLUDED.duration_ms,
                 result = EXCLUDED.result,
                 error = EXCLUDED.error",
        )
        .bind(record.pipeline_run_id)
        .bind(record.stage.as_str())
        .bind(record.status.as_str())
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(record.duration_ms)
        .bind(&record.result)
        .bind(&record.error)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                LedgerError::RunNotFound(record.pipeline_run_id)
            }
            other => storage(other),
        })?;

        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<PipelineRun>, LedgerError> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM pipeline_runs WHERE id = $1"
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(decode_run).transpose()
    }

    async fn stage_runs(&self, run_id: Uuid) -> Result<Vec<PipelineStageRun>, LedgerError> {
        let rows: Vec<StageRow> = sqlx::query_as(
            "SELECT pipeline_run_id, stage, status, started_at, completed_at, duration_ms, result, error
             FROM pipeline_stage_runs
             WHERE pipeline_run_id = $1",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut records = rows
            .into_iter()
            .map(decode_stage)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|record| record.stage.position());
        Ok(records)
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<PipelineRun>, LedgerError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM pipeline_runs ORDER BY started_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter().map(decode_run).collect()
    }
}
