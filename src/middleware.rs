use axum::extract::{ConnectInfo, Extension};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use crate::config;
use crate::error::AppError;
use crate::state::AppState;

/// Per-client-IP sliding window, exempting `/health` (spec.md §4.5.2).
/// Applied as a `tower`/axum middleware layer ahead of routing so every
/// other route pays the same cost, the teacher's `PrometheusMetricLayer`
/// placement generalized to a gate instead of an observer.
pub async fn rate_limit<B>(
    Extension(state): Extension<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<B>,
    next: Next<B>,
) -> Result<Response, AppError> {
    if !*config::RATE_LIMIT_ENABLED || request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let client_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string());

    let decision = state.rate_limiter.check(&client_ip);
    if !decision.allowed {
        tracing::warn!(client_ip, "rate limit exceeded");
        return Err(AppError::RateLimited { limit: decision.limit });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-ratelimit-limit",
        decision.limit.to_string().parse().unwrap(),
    );
    headers.insert(
        "x-ratelimit-remaining",
        decision.remaining.to_string().parse().unwrap(),
    );
    Ok(response)
}

/// One structured log line per request: route, status, duration_ms,
/// error_type when present (spec.md §4.5.2).
pub async fn access_log<B>(request: Request<B>, next: Next<B>) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis();
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        tracing::warn!(%method, path, status = status.as_u16(), duration_ms, "request completed");
    } else {
        tracing::info!(%method, path, status = status.as_u16(), duration_ms, "request completed");
    }
    response
}
