//! Route handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::auth::{CronAuth, ErrorResponse};
use super::AppState;
use crate::core::StageName;
use crate::errors::OrchestratorError;
use crate::pipeline::{PipelineOutcome, SkipReason, StandaloneOutcome};
use crate::registry::schedules;

/// Trigger label used when the caller gives none.
pub const DEFAULT_TRIGGER: &str = "cron";

/// Default page size of `GET /runs`.
pub const DEFAULT_RUNS_LIMIT: usize = 20;

/// Largest page size of `GET /runs`.
pub const MAX_RUNS_LIMIT: usize = 100;

/// Query string of the trigger endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct TriggerQuery {
    /// Recorded on the run; defaults to `cron`.
    pub trigger: Option<String>,
}

impl TriggerQuery {
    fn trigger(&self) -> &str {
        self.trigger
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TRIGGER)
    }
}

/// Query string of `GET /runs`.
#[derive(Debug, Default, Deserialize)]
pub struct RunsQuery {
    /// Page size, capped at [`MAX_RUNS_LIMIT`].
    pub limit: Option<usize>,
}

fn skipped(reason: SkipReason) -> Response {
    Json(json!({ "status": "skipped", "reason": reason.as_str() })).into_response()
}

fn task_failed(err: &tokio::task::JoinError) -> Response {
    let err = OrchestratorError::Internal(format!("run task failed: {err}"));
    error!(error = %err, "Run task did not complete");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "status": "error", "runId": null, "error": err.to_string() })),
    )
        .into_response()
}

fn storage_error(err: impl std::fmt::Display) -> Response {
    error!(error = %err, "Ledger read failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(err.to_string())),
    )
        .into_response()
}

/// GET|POST /pipeline: runs every stage in order under the pipeline lock.
///
/// The run executes on its own task, so a caller that disconnects or times
/// out does not cancel it mid-stage.
pub async fn run_pipeline(
    State(state): State<Arc<AppState>>,
    _auth: CronAuth,
    Query(query): Query<TriggerQuery>,
) -> Response {
    let pipeline = state.pipeline.clone();
    let trigger = query.trigger().to_string();
    let outcome = match tokio::spawn(async move { pipeline.run(&trigger).await }).await {
        Ok(outcome) => outcome,
        Err(err) => return task_failed(&err),
    };

    match outcome {
        PipelineOutcome::Skipped(reason) => skipped(reason),
        PipelineOutcome::Finished(report) => Json(report).into_response(),
        PipelineOutcome::Errored {
            run_id,
            error,
            stages,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "runId": run_id,
                "error": error,
                "stages": stages,
            })),
        )
            .into_response(),
    }
}

/// GET|POST /{stage}: runs one stage under its own lock, detached like
/// [`run_pipeline`].
pub async fn run_stage(
    state: Arc<AppState>,
    stage: StageName,
    query: TriggerQuery,
) -> Response {
    let standalone = state.standalone.clone();
    let trigger = query.trigger().to_string();
    let outcome = match tokio::spawn(async move { standalone.run(stage, &trigger).await }).await {
        Ok(outcome) => outcome,
        Err(err) => return task_failed(&err),
    };

    match outcome {
        StandaloneOutcome::Skipped(reason) => skipped(reason),
        StandaloneOutcome::Completed { run_id, result, .. } => {
            let mut body = result.into_map();
            body.insert("status".to_string(), Value::from("completed"));
            body.insert("runId".to_string(), json!(run_id));
            Json(Value::Object(body)).into_response()
        }
        StandaloneOutcome::Failed { run_id, error } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "runId": run_id, "error": error })),
        )
            .into_response(),
    }
}

/// GET /runs: most recent runs, newest first.
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    _auth: CronAuth,
    Query(query): Query<RunsQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RUNS_LIMIT)
        .clamp(1, MAX_RUNS_LIMIT);

    match state.ledger.recent_runs(limit).await {
        Ok(runs) => Json(json!({ "runs": runs })).into_response(),
        Err(e) => storage_error(e),
    }
}

/// GET /runs/{id}: one run with its stage records.
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    _auth: CronAuth,
    Path(run_id): Path<Uuid>,
) -> Response {
    let run = match state.ledger.get_run(run_id).await {
        Ok(Some(run)) => run,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Run not found")),
            )
                .into_response();
        }
        Err(e) => return storage_error(e),
    };

    match state.ledger.stage_runs(run_id).await {
        Ok(stages) => Json(json!({ "run": run, "stages": stages })).into_response(),
        Err(e) => storage_error(e),
    }
}

/// GET /schedule: the cadence and lock registry.
pub async fn get_schedule(_auth: CronAuth) -> Response {
    Json(json!({ "jobs": schedules() })).into_response()
}

/// GET /health: liveness, unauthenticated.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "ok",
        "splitJobsEnabled": state.standalone.split_jobs_enabled(),
    }))
    .into_response()
}
