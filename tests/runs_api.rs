//! End-to-end contract tests against the ingestion API router, exercised
//! in-process via `tower::ServiceExt::oneshot` (SPEC_FULL.md §2 "Test
//! tooling"). Each test below corresponds to one of the concrete
//! end-to-end scenarios or invariants in spec.md §8.

use axum::body::Body;
use axum::extract::Extension;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use runtrace::db::Db;
use runtrace::ratelimit::RateLimiter;
use runtrace::routes::api_routes;
use runtrace::state::AppState;

fn test_app() -> Router {
    let db = Db::open_in_memory().expect("in-memory db opens");
    let state = AppState {
        db,
        rate_limiter: Arc::new(RateLimiter::new(u32::MAX)),
    };
    api_routes().layer(Extension(state))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("router is infallible");
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is JSON")
    };
    (status, body)
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn patch(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn new_run(event_id: &str, run_id: &str, agent_name: &str, status: &str) -> Value {
    json!({
        "event_id": event_id,
        "run_id": run_id,
        "agent_name": agent_name,
        "job_type": "sync",
        "start_time": "2026-01-01T00:00:00Z",
        "status": status,
    })
}

/// spec.md §8.3 scenario 1: create -> update -> fetch.
#[tokio::test]
async fn create_update_fetch() {
    let app = test_app();

    let (status, body) = send(&app, post("/api/v1/runs", new_run("e1", "r1", "a", "running"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "created");
    assert_eq!(body["event_id"], "e1");
    assert_eq!(body["run_id"], "r1");

    let (status, body) = send(
        &app,
        patch(
            "/api/v1/runs/e1",
            json!({
                "status": "completed",
                "end_time": "2026-01-01T00:00:05Z",
                "duration_ms": 5000,
                "items_succeeded": 3,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], true);
    let mut fields = body["fields_updated"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    fields.sort();
    assert_eq!(
        fields,
        vec!["duration_ms", "end_time", "items_succeeded", "status"]
    );

    let (status, body) = send(&app, get("/api/v1/runs/e1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["duration_ms"], 5000);
}

/// spec.md §8.3 scenario 2 / §8.2 idempotency law.
#[tokio::test]
async fn duplicate_post_is_idempotent() {
    let app = test_app();
    let record = new_run("e2", "r2", "a", "running");

    let (status, _) = send(&app, post("/api/v1/runs", record.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, post("/api/v1/runs", record)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "duplicate");
    assert_eq!(body["event_id"], "e2");

    let (status, body) = send(&app, get("/api/v1/runs")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.iter().filter(|r| r["event_id"] == "e2").count(), 1);
}

/// spec.md §8.3 scenario 3: status alias in query filter.
#[tokio::test]
async fn query_with_status_alias() {
    let app = test_app();
    send(&app, post("/api/v1/runs", new_run("e3a", "r3a", "a", "failure"))).await;
    send(&app, post("/api/v1/runs", new_run("e3b", "r3b", "a", "success"))).await;

    let (status, body) = send(&app, get("/api/v1/runs?status=failed")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], "failure");
    assert_eq!(rows[0]["event_id"], "e3a");
}

/// spec.md §8.3 scenario 4: batch partial failure, never a top-level
/// error.
#[tokio::test]
async fn batch_partial_failure_never_errors() {
    let app = test_app();

    // seed "b1" so the second element of the batch collides with it.
    send(&app, post("/api/v1/runs", new_run("b1", "r1", "a", "success"))).await;

    let batch = json!([
        new_run("b1", "r1", "a", "success"),
        new_run("b3", "r3", "a", "bogus"),
        new_run("b4", "r4", "a", "success"),
    ]);

    let (status, body) = send(&app, post("/api/v1/runs/batch", batch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], 1);
    assert_eq!(body["duplicates"], 1);
    assert_eq!(body["total"], 3);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["event_id"], "b3");
}

/// spec.md §8.3 scenario 7: commit-url / repo-url, including the
/// self-hosted / unsupported-scheme degradation case.
#[tokio::test]
async fn commit_url_and_repo_url() {
    let app = test_app();
    let mut record = new_run("e7", "r7", "a", "success");
    record["git_repo"] = json!("git@github.com:o/r.git");
    record["git_commit_hash"] = json!("abc1234");
    send(&app, post("/api/v1/runs", record)).await;

    let (status, body) = send(&app, get("/api/v1/runs/e7/commit-url")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["commit_url"], "https://github.com/o/r/commit/abc1234");

    let (status, body) = send(&app, get("/api/v1/runs/e7/repo-url")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["repo_url"], "https://github.com/o/r");

    let mut unsupported = new_run("e7b", "r7b", "a", "success");
    unsupported["git_repo"] = json!("ftp://x");
    unsupported["git_commit_hash"] = json!("abc1234");
    send(&app, post("/api/v1/runs", unsupported)).await;

    let (_, body) = send(&app, get("/api/v1/runs/e7b/commit-url")).await;
    assert_eq!(body["commit_url"], Value::Null);
    let (_, body) = send(&app, get("/api/v1/runs/e7b/repo-url")).await;
    assert_eq!(body["repo_url"], Value::Null);
}

/// spec.md §4.5.1 associate-commit: overwrites git_commit_* fields.
#[tokio::test]
async fn associate_commit_overwrites_and_404s_on_missing() {
    let app = test_app();
    send(&app, post("/api/v1/runs", new_run("e8", "r8", "a", "success"))).await;

    let (status, body) = send(
        &app,
        post(
            "/api/v1/runs/e8/associate-commit",
            json!({
                "git_commit_hash": "deadbee",
                "git_commit_source": "ci",
                "git_commit_author": "alice",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (_, body) = send(&app, get("/api/v1/runs/e8")).await;
    assert_eq!(body["git_commit_hash"], "deadbee");
    assert_eq!(body["git_commit_source"], "ci");

    let (status, _) = send(
        &app,
        post(
            "/api/v1/runs/does-not-exist/associate-commit",
            json!({"git_commit_hash": "deadbee", "git_commit_source": "ci"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// spec.md §8.1: successive pages partition the result set without
/// overlap or gap under `ORDER BY created_at DESC`.
#[tokio::test]
async fn pagination_partitions_without_overlap() {
    let app = test_app();
    for i in 0..5 {
        send(
            &app,
            post(
                "/api/v1/runs",
                new_run(&format!("p{i}"), &format!("r{i}"), "a", "success"),
            ),
        )
        .await;
    }

    let (_, page1) = send(&app, get("/api/v1/runs?limit=2&offset=0")).await;
    let (_, page2) = send(&app, get("/api/v1/runs?limit=2&offset=2")).await;
    let (_, page3) = send(&app, get("/api/v1/runs?limit=2&offset=4")).await;

    let ids_of = |page: &Value| {
        page.as_array()
            .unwrap()
            .iter()
            .map(|r| r["event_id"].as_str().unwrap().to_string())
            .collect::<Vec<_>>()
    };
    let (p1, p2, p3) = (ids_of(&page1), ids_of(&page2), ids_of(&page3));
    assert_eq!(p1.len(), 2);
    assert_eq!(p2.len(), 2);
    assert_eq!(p3.len(), 1);

    let mut all = p1.clone();
    all.extend(p2.clone());
    all.extend(p3.clone());
    let mut unique = all.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(all.len(), unique.len(), "pages must not overlap");
    assert_eq!(unique.len(), 5, "pages must not leave a gap");
}

/// spec.md §4.5.2: validation failures return 422 with field detail.
#[tokio::test]
async fn negative_counter_is_rejected_with_422() {
    let app = test_app();
    let mut record = new_run("e9", "r9", "a", "running");
    record["duration_ms"] = json!(-5);

    let (status, body) = send(&app, post("/api/v1/runs", record)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].is_array());
}

/// spec.md §4.1: PATCH with no settable fields is rejected with 400;
/// PATCH against a missing event_id is 404.
#[tokio::test]
async fn empty_patch_and_missing_event_id() {
    let app = test_app();
    send(&app, post("/api/v1/runs", new_run("e10", "r10", "a", "running"))).await;

    let (status, _) = send(&app, patch("/api/v1/runs/e10", json!({"event_id": "nope"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, patch("/api/v1/runs/does-not-exist", json!({"status": "success"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// spec.md §4.5.1 `/api/v1/metadata`: distinct, alphabetical, NULLs excluded.
#[tokio::test]
async fn metadata_lists_distinct_values() {
    let app = test_app();
    send(&app, post("/api/v1/runs", new_run("e11", "r11", "zeta", "success"))).await;
    send(&app, post("/api/v1/runs", new_run("e12", "r12", "alpha", "success"))).await;

    let (status, body) = send(&app, get("/api/v1/metadata")).await;
    assert_eq!(status, StatusCode::OK);
    let names = body["agent_names"].as_array().unwrap();
    let names: Vec<&str> = names.iter().map(|v| v.as_str().unwrap()).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}

/// spec.md §6.4: /health never requires I/O and always reports ok.
#[tokio::test]
async fn health_is_always_ok() {
    let app = test_app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

/// spec.md §6.4 /metrics: total, per-agent counts, recent_24h.
#[tokio::test]
async fn metrics_reports_aggregate_counts() {
    let app = test_app();
    send(&app, post("/api/v1/runs", new_run("e13", "r13", "a", "success"))).await;
    send(&app, post("/api/v1/runs", new_run("e14", "r14", "a", "success"))).await;

    let (status, body) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_runs"], 2);
    assert_eq!(body["agents"]["a"], 2);
}

/// spec.md §4.5.3 step 5 / §9: JSON columns round-trip or attach a
/// sibling parse-error marker, never silently dropping the raw value.
#[tokio::test]
async fn metrics_json_round_trips() {
    let app = test_app();
    let mut record = new_run("e15", "r15", "a", "success");
    record["metrics_json"] = json!({"latency_ms": 42, "ok": true});
    send(&app, post("/api/v1/runs", record)).await;

    let (_, body) = send(&app, get("/api/v1/runs/e15")).await;
    assert_eq!(body["metrics_json"]["latency_ms"], 42);
    assert_eq!(body["metrics_json"]["ok"], true);
    assert!(body.get("metrics_json_parse_error").is_none());
}
