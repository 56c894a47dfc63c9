//! HTTP surface for the external scheduler.
//!
//! Every route except `/health` requires `Authorization: Bearer <CRON_SECRET>`.
//! Trigger routes accept GET and POST so any cron service can call them.

pub mod auth;
pub mod handlers;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::core::StageName;
use crate::ledger::Ledger;
use crate::pipeline::{FullPipelineExecutor, Orchestrator, StandaloneStageExecutor};
use auth::CronAuth;
use handlers::TriggerQuery;

/// Shared state of the HTTP layer.
pub struct AppState {
    /// Expected bearer secret.
    pub cron_secret: String,
    /// Full-pipeline executor.
    pub pipeline: FullPipelineExecutor,
    /// Standalone-stage executor.
    pub standalone: StandaloneStageExecutor,
    /// Ledger read side.
    pub ledger: Arc<dyn Ledger>,
}

impl AppState {
    /// Builds both executors over one orchestrator.
    #[must_use]
    pub fn new(cron_secret: impl Into<String>, orchestrator: Orchestrator, split_jobs_enabled: bool) -> Self {
        Self {
            cron_secret: cron_secret.into(),
            ledger: Arc::clone(orchestrator.ledger()),
            pipeline: FullPipelineExecutor::new(orchestrator.clone()),
            standalone: StandaloneStageExecutor::new(orchestrator, split_jobs_enabled),
        }
    }
}

/// Builds the router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route(
            "/pipeline",
            get(handlers::run_pipeline).post(handlers::run_pipeline),
        )
        .route("/runs", get(handlers::list_runs))
        .route("/runs/:id", get(handlers::get_run))
        .route("/schedule", get(handlers::get_schedule))
        .route("/health", get(handlers::get_health));

    for stage in StageName::PIPELINE_ORDER {
        let handler = move |State(state): State<Arc<AppState>>,
                            _auth: CronAuth,
                            Query(query): Query<TriggerQuery>| {
            handlers::run_stage(state, stage, query)
        };
        router = router.route(&format!("/{stage}"), get(handler).post(handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
