use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{health, metadata, metrics, runs};

/// Assembles the ingestion API router. `GET /runs/{event_id}` is
/// registered before `GET /runs` so path matching resolves the direct
/// fetch first (spec.md §4.5.1, §9 "Route ordering").
pub fn api_routes() -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::metrics))
        .route("/api/v1/metadata", get(metadata::metadata))
        .route("/api/v1/runs/:event_id/commit-url", get(runs::commit_url))
        .route("/api/v1/runs/:event_id/repo-url", get(runs::repo_url))
        .route(
            "/api/v1/runs/:event_id/associate-commit",
            post(runs::associate_commit),
        )
        .route(
            "/api/v1/runs/:event_id",
            get(runs::get_by_id).patch(runs::update),
        )
        .route("/api/v1/runs/batch", post(runs::batch_create))
        .route("/api/v1/runs", get(runs::list).post(runs::create))
}
