//! End-to-end tests for the client delivery pipeline (spec.md §4.6)
//! against a real local HTTP server via `httpmock`, the teacher's own
//! choice of mock-server crate for this kind of test.

use httpmock::MockServer;
use once_cell::sync::Lazy;
use serde_json::json;
use tempfile::TempDir;

use runtrace::client::{get_run_id_metrics, Client};

/// All tests in this binary share one temp dir for `TELEMETRY_BASE_DIR`
/// so the event-log/failover-buffer directories (driven by process-wide
/// `once_cell::sync::Lazy` statics in `config`) are set before anything
/// reads them, regardless of test execution order.
static BASE_DIR: Lazy<TempDir> = Lazy::new(|| {
    let dir = tempfile::tempdir().expect("tempdir");
    std::env::set_var("TELEMETRY_BASE_DIR", dir.path());
    dir
});

fn raw_dir() -> std::path::PathBuf {
    Lazy::force(&BASE_DIR).path().join("raw")
}

fn buffer_dir() -> std::path::PathBuf {
    Lazy::force(&BASE_DIR).path().join("buffer")
}

fn todays_event_log_contains(needle: &str) -> bool {
    let filename = format!("events_{}.ndjson", chrono::Utc::now().format("%Y%m%d"));
    let path = raw_dir().join(filename);
    std::fs::read_to_string(path)
        .map(|contents| contents.contains(needle))
        .unwrap_or(false)
}

fn count_buffer_files() -> usize {
    std::fs::read_dir(buffer_dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().map(|ext| ext == "json").unwrap_or(false))
                .count()
        })
        .unwrap_or(0)
}

/// `start_run`/`end_run` dual-write to the event log on every path, and
/// to the API when it is reachable (spec.md §4.6.5).
#[tokio::test]
async fn start_and_end_run_happy_path_writes_log_and_api() {
    Lazy::force(&BASE_DIR);
    let server = MockServer::start();
    let create_mock = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/api/v1/runs");
        then.status(201).json_body(json!({"status": "created"}));
    });
    let patch_mock = server.mock(|when, then| {
        when.method(httpmock::Method::PATCH);
        then.status(200).json_body(json!({"updated": true}));
    });

    let client = Client::new(server.base_url());
    let (event_id, run_id) = client.start_run("agent-a", "sync", None).await;
    assert!(!run_id.is_empty());
    assert!(todays_event_log_contains(&event_id));

    client.end_run(&event_id, "success", None, None).await;

    create_mock.assert();
    patch_mock.assert();
    assert!(todays_event_log_contains("end_run"));
}

/// spec.md §4.6.3: `track_run` ends with `success` on an `Ok` body and
/// removes the registry entry on every exit path.
#[tokio::test]
async fn track_run_success_clears_registry() {
    Lazy::force(&BASE_DIR);
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/api/v1/runs");
        then.status(201).json_body(json!({"status": "created"}));
    });
    server.mock(|when, then| {
        when.method(httpmock::Method::PATCH);
        then.status(200).json_body(json!({"updated": true}));
    });

    let client = Client::new(server.base_url());
    let result: Result<i32, String> = client
        .track_run("agent-b", "sync", None, |ctx| async move {
            ctx.log_event("step", None);
            ctx.set_metrics(json!({"rows": 3}));
            Ok(7)
        })
        .await;

    assert_eq!(result.unwrap(), 7);
}

/// spec.md §4.6.3: on a failing scope body, `end_run(status=failure,
/// error_summary=...)` runs and the error propagates to the caller.
#[tokio::test]
async fn track_run_failure_reports_and_propagates() {
    Lazy::force(&BASE_DIR);
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/api/v1/runs");
        then.status(201).json_body(json!({"status": "created"}));
    });
    let patch_mock = server.mock(|when, then| {
        when.method(httpmock::Method::PATCH);
        then.status(200).json_body(json!({"updated": true}));
    });

    let client = Client::new(server.base_url());
    let result: Result<(), String> = client
        .track_run("agent-c", "sync", None, |_ctx| async move {
            Err("boom".to_string())
        })
        .await;

    assert_eq!(result.unwrap_err(), "boom");
    patch_mock.assert();
}

/// spec.md §4.6.4: an over-length custom `run_id` is rejected, falls
/// back to a generated id, and the rejection is counted.
#[tokio::test]
async fn custom_run_id_rejection_falls_back() {
    Lazy::force(&BASE_DIR);
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::POST);
        then.status(201).json_body(json!({"status": "created"}));
    });

    let before = get_run_id_metrics().rejected.too_long;
    let client = Client::new(server.base_url());
    let too_long = "x".repeat(300);
    let (_, run_id) = client.start_run("agent-d", "sync", Some(&too_long)).await;

    assert_ne!(run_id, too_long);
    assert_eq!(get_run_id_metrics().rejected.too_long, before + 1);
}

/// spec.md §4.6.5: a non-2xx/unreachable API response falls back to the
/// durable failover buffer rather than being lost, and the attempt is
/// still recorded in the event log either way.
#[tokio::test]
async fn api_failure_falls_back_to_buffer() {
    Lazy::force(&BASE_DIR);
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/api/v1/runs");
        then.status(503);
    });

    let before = count_buffer_files();
    let client = Client::new(server.base_url());
    let (event_id, _run_id) = client.start_run("agent-e", "sync", None).await;

    assert!(todays_event_log_contains(&event_id));
    assert!(count_buffer_files() > before);
}

/// spec.md §4.6.5: `log_event` writes only to the event log, never to
/// the API.
#[tokio::test]
async fn log_event_never_touches_the_api() {
    Lazy::force(&BASE_DIR);
    let server = MockServer::start();
    let post_mock = server.mock(|when, then| {
        when.method(httpmock::Method::POST);
        then.status(201).json_body(json!({"status": "created"}));
    });

    let client = Client::new(server.base_url());
    client.log_event("standalone-event-id", "progress", Some(json!({"n": 1})));

    assert!(todays_event_log_contains("standalone-event-id"));
    assert_eq!(post_mock.hits(), 0);
}
