//! Exercises the auth and rate-limit middleware layered the way
//! `main.rs` layers them (spec.md §4.5.2), since `tests/runs_api.rs`
//! deliberately runs the bare router without these layers.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::{Extension, Router};
use once_cell::sync::Lazy;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower::ServiceExt;

use runtrace::db::Db;
use runtrace::middleware::{access_log, rate_limit};
use runtrace::ratelimit::RateLimiter;
use runtrace::routes::api_routes;
use runtrace::state::AppState;

/// `config`'s knobs are `once_cell::sync::Lazy` statics, evaluated once
/// per process — this file is its own test binary, so setting these
/// before the first config read fixes them for every test below.
static CONFIGURED: Lazy<()> = Lazy::new(|| {
    std::env::set_var("TELEMETRY_API_AUTH_ENABLED", "true");
    std::env::set_var("TELEMETRY_API_AUTH_TOKEN", "test-token");
    std::env::set_var("TELEMETRY_RATE_LIMIT_ENABLED", "true");
    std::env::set_var("TELEMETRY_RATE_LIMIT_RPM", "3");
});

fn test_app() -> Router {
    Lazy::force(&CONFIGURED);
    let state = AppState {
        db: Db::open_in_memory().expect("in-memory db"),
        rate_limiter: Arc::new(RateLimiter::new(3)),
    };
    api_routes()
        .layer(axum::middleware::from_fn(rate_limit))
        .layer(axum::middleware::from_fn(access_log))
        .layer(Extension(state))
}

fn addr(last_octet: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)), 9999)
}

async fn send(app: &Router, mut req: Request<Body>, from: SocketAddr) -> (StatusCode, axum::http::HeaderMap) {
    req.extensions_mut().insert(ConnectInfo(from));
    let response = app.clone().oneshot(req).await.unwrap();
    (response.status(), response.headers().clone())
}

fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// spec.md §4.5.2: a protected route without a bearer token is rejected.
#[tokio::test]
async fn missing_token_is_rejected() {
    let app = test_app();
    let (status, _) = send(&app, get("/api/v1/runs", None), addr(1)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// A wrong token is rejected the same as a missing one.
#[tokio::test]
async fn wrong_token_is_rejected() {
    let app = test_app();
    let (status, _) = send(&app, get("/api/v1/runs", Some("not-it")), addr(2)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// The configured token is accepted.
#[tokio::test]
async fn correct_token_is_accepted() {
    let app = test_app();
    let (status, _) = send(&app, get("/api/v1/runs", Some("test-token")), addr(3)).await;
    assert_eq!(status, StatusCode::OK);
}

/// `/health` never requires auth, even with auth enabled globally.
#[tokio::test]
async fn health_is_exempt_from_auth() {
    let app = test_app();
    let (status, _) = send(&app, get("/health", None), addr(4)).await;
    assert_eq!(status, StatusCode::OK);
}

/// spec.md §4.5.2: requests beyond the per-minute limit are rejected
/// with headers describing the limit, and `/health` is exempt from the
/// count entirely.
#[tokio::test]
async fn rate_limit_blocks_after_the_configured_count() {
    let app = test_app();
    let client_ip = addr(5);

    for _ in 0..3 {
        let (status, headers) = send(&app, get("/api/v1/runs", Some("test-token")), client_ip).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key("x-ratelimit-remaining"));
    }

    let (status, headers) = send(&app, get("/api/v1/runs", Some("test-token")), client_ip).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.contains_key("retry-after"));

    for _ in 0..10 {
        let (status, _) = send(&app, get("/health", Some("test-token")), client_ip).await;
        assert_eq!(status, StatusCode::OK);
    }
}

/// Rate limits are tracked per client IP, not globally.
#[tokio::test]
async fn rate_limit_is_per_client_ip() {
    let app = test_app();

    for _ in 0..3 {
        let (status, _) = send(&app, get("/api/v1/runs", Some("test-token")), addr(6)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(&app, get("/api/v1/runs", Some("test-token")), addr(6)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = send(&app, get("/api/v1/runs", Some("test-token")), addr(7)).await;
    assert_eq!(status, StatusCode::OK);
}
