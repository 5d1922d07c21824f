use axum::{extract::Extension, Json};
use serde_json::json;

use crate::config;
use crate::state::AppState;

/// `GET /health` — liveness only, no I/O: "process is up", not "database
/// is healthy" (spec.md §4.5.1, §6.4). Never requires auth and is exempt
/// from rate limiting.
pub async fn health(Extension(_state): Extension<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "db_path": config::DB_PATH.display().to_string(),
        "journal_mode": config::DB_JOURNAL_MODE.as_str(),
        "synchronous": config::DB_SYNCHRONOUS.as_str(),
    }))
}
