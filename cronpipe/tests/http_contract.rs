//! HTTP contract tests.
//!
//! Builds the router in-process and drives it with
//! `tower::ServiceExt::oneshot()`; no port is bound.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cronpipe::api::{router, AppState};
use cronpipe::core::{RunStatus, StageName, StageRunStatus};
use cronpipe::ledger::{Ledger, PipelineRun};
use cronpipe::stages::{Stage, StageResult};
use cronpipe::testing::{BlockingStage, FailingStage, MockStage, SlowStage, TestHarness};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "cron-secret";

fn app(harness: &TestHarness, split_jobs_enabled: bool) -> Router {
    router(Arc::new(AppState::new(
        SECRET,
        harness.orchestrator.clone(),
        split_jobs_enabled,
    )))
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

/// Waits until the newest run is terminal and its lock is gone.
async fn wait_for_settled_run(harness: &TestHarness) -> PipelineRun {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let newest = harness.ledger.recent_runs(1).await.unwrap().into_iter().next();
            if let Some(run) = newest {
                if run.status.is_terminal() && harness.locks.inner().is_empty() {
                    return run;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run was never finalized")
}

/// Missing or wrong bearer tokens are rejected before any lock or ledger work.
#[tokio::test]
async fn test_unauthorized_has_no_side_effects() {
    let ingest = Arc::new(MockStage::new(StageName::Ingest));
    let harness = TestHarness::with_overrides(vec![ingest.clone() as Arc<dyn Stage>]);

    for (uri, token) in [
        ("/pipeline", None),
        ("/pipeline", Some("wrong")),
        ("/ingest", None),
        ("/ingest", Some("Bearer")),
        ("/runs", None),
    ] {
        let (status, json) = send(app(&harness, true), get(uri, token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri} with {token:?}");
        assert_eq!(json, json!({"error": "Unauthorized"}));
    }

    assert_eq!(harness.locks.acquire_calls(), 0);
    assert_eq!(harness.ledger.run_count(), 0);
    assert_eq!(ingest.call_count(), 0);
}

/// A non-Bearer scheme is treated like a missing token.
#[tokio::test]
async fn test_basic_scheme_rejected() {
    let harness = TestHarness::new(cronpipe::testing::noop_registry());
    let req = Request::builder()
        .uri("/pipeline")
        .header("authorization", format!("Basic {SECRET}"))
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(app(&harness, true), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// A held lock makes the trigger return "already running" without running anything.
#[tokio::test]
async fn test_pipeline_contention_skips() {
    let ingest = Arc::new(MockStage::new(StageName::Ingest));
    let harness = TestHarness::with_overrides(vec![ingest.clone() as Arc<dyn Stage>]);
    let held = harness
        .orchestrator
        .locks()
        .acquire("pipeline", 900)
        .await
        .unwrap()
        .unwrap();

    let (status, json) = send(app(&harness, false), get("/pipeline", Some(SECRET))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "skipped", "reason": "already running"}));
    assert_eq!(ingest.call_count(), 0);
    assert_eq!(harness.ledger.run_count(), 0);
    held.release().await.unwrap();
}

#[tokio::test]
async fn test_stage_contention_skips() {
    let briefing = Arc::new(MockStage::new(StageName::Briefing));
    let harness = TestHarness::with_overrides(vec![briefing.clone() as Arc<dyn Stage>]);
    let held = harness
        .orchestrator
        .locks()
        .acquire("briefing", 120)
        .await
        .unwrap()
        .unwrap();

    let (status, json) = send(app(&harness, true), get("/briefing", Some(SECRET))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "skipped", "reason": "already running"}));
    assert_eq!(briefing.call_count(), 0);
    held.release().await.unwrap();
}

#[tokio::test]
async fn test_split_jobs_disabled() {
    let ingest = Arc::new(MockStage::new(StageName::Ingest));
    let harness = TestHarness::with_overrides(vec![ingest.clone() as Arc<dyn Stage>]);

    let (status, json) = send(app(&harness, false), get("/ingest", Some(SECRET))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "skipped", "reason": "split_jobs_disabled"}));
    assert_eq!(harness.locks.acquire_calls(), 0);
    assert_eq!(harness.ledger.run_count(), 0);
    assert_eq!(ingest.call_count(), 0);
}

/// A failing standalone stage yields 500 with the run id and releases its lock once.
#[tokio::test]
async fn test_standalone_failure_returns_500() {
    let harness = TestHarness::with_overrides(vec![
        Arc::new(FailingStage::new(StageName::Aggregate, "Pipeline failed")) as Arc<dyn Stage>,
    ]);

    let (status, json) = send(app(&harness, true), get("/aggregate", Some(SECRET))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"], "Pipeline failed");
    assert!(json["runId"].is_string());
    assert_eq!(harness.locks.release_calls(), 1);
    assert!(harness.locks.inner().is_empty());

    let run_id = json["runId"].as_str().unwrap().parse().unwrap();
    let run = harness.ledger.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

/// A successful standalone stage merges its result fields into the body.
#[tokio::test]
async fn test_standalone_success_merges_result() {
    let ingest = Arc::new(
        MockStage::new(StageName::Ingest).with_result(
            StageResult::new()
                .with("inserted", 14)
                .with("feeds", 3)
                .with("status", "ignored"),
        ),
    );
    let harness = TestHarness::with_overrides(vec![ingest.clone() as Arc<dyn Stage>]);

    let (status, json) = send(app(&harness, true), get("/ingest?trigger=manual", Some(SECRET))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["inserted"], 14);
    assert_eq!(json["feeds"], 3);
    assert!(json["runId"].is_string());
    assert_eq!(ingest.call_count(), 1);
    assert_eq!(harness.locks.acquire_calls(), 1);
    assert_eq!(harness.locks.release_calls(), 1);
    assert_eq!(harness.cache.count(), 1);

    let runs = harness.ledger.recent_runs(1).await.unwrap();
    assert_eq!(runs[0].trigger, "manual");
}

/// A stage failure inside the full pipeline is a reported verdict, not a server error.
#[tokio::test]
async fn test_pipeline_failure_is_reported_with_200() {
    let harness = TestHarness::with_overrides(vec![
        Arc::new(FailingStage::new(StageName::Enrich, "enrichment model offline")) as Arc<dyn Stage>,
    ]);

    let (status, json) = send(app(&harness, false), get("/pipeline", Some(SECRET))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error"], "enrichment model offline");
    assert_eq!(
        json["stages"][1],
        json!({
            "stage": "enrich",
            "status": "failed",
            "durationMs": json["stages"][1]["durationMs"].clone(),
            "error": "enrichment model offline"
        })
    );
    assert_eq!(
        json["stages"][2],
        json!({
            "stage": "analyze",
            "status": "skipped",
            "durationMs": 0,
            "error": "upstream stage failed"
        })
    );
}

/// A lock store outage is an orchestrator error without a run.
#[tokio::test]
async fn test_lock_store_outage_returns_500() {
    let harness = TestHarness::new(cronpipe::testing::noop_registry());
    harness.locks.fail_acquire(true);

    let resp = app(&harness, false)
        .oneshot(get("/pipeline", Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["runId"], Value::Null);
    assert_eq!(
        json["error"],
        "Lock store error for 'lock:pipeline': connection refused"
    );
    assert_eq!(harness.ledger.run_count(), 0);
}

/// A scheduler that hangs up mid-stage must not orphan the run.
#[tokio::test]
async fn test_pipeline_survives_client_disconnect() {
    let analyze = Arc::new(BlockingStage::new(StageName::Analyze));
    let harness = TestHarness::with_overrides(vec![analyze.clone() as Arc<dyn Stage>]);

    let request = tokio::spawn(app(&harness, false).oneshot(get("/pipeline", Some(SECRET))));
    analyze.wait_until_entered().await;
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());

    analyze.unblock();
    let run = wait_for_settled_run(&harness).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.completed_at.is_some());
    let stages = harness.ledger.stage_runs(run.id).await.unwrap();
    assert_eq!(stages.len(), 6);
    assert!(stages.iter().all(|s| s.status == StageRunStatus::Completed));
    assert_eq!(harness.locks.release_calls(), 1);
}

/// A client timeout on a standalone trigger leaves the stage running to completion.
#[tokio::test]
async fn test_stage_survives_client_timeout() {
    let harness = TestHarness::with_overrides(vec![
        Arc::new(SlowStage::new(StageName::Ingest, Duration::from_millis(200))) as Arc<dyn Stage>,
    ]);

    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        app(&harness, true).oneshot(get("/ingest", Some(SECRET))),
    )
    .await;
    assert!(timed_out.is_err());

    let run = wait_for_settled_run(&harness).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.source, "cron/ingest");
    let stages = harness.ledger.stage_runs(run.id).await.unwrap();
    assert_eq!(stages[0].status, StageRunStatus::Completed);
    assert!(stages[0].duration_ms >= 200);
    assert_eq!(harness.cache.count(), 1);
}
