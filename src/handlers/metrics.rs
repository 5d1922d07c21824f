use axum::{extract::Extension, Json};
use serde_json::json;

use crate::auth::Authenticated;
use crate::config;
use crate::error::AppResult;
use crate::state::AppState;

/// `GET /metrics` — three aggregate queries: total, per-agent counts
/// descending, last-24h count, plus db path + journal mode (spec.md
/// §4.5.1, §6.4). Requires auth when enabled, like every route but
/// `/health` and `/api/v1/metadata` (spec.md §4.5.2) — it leaks
/// `db_path` and run counts.
pub async fn metrics(
    _auth: Authenticated,
    Extension(state): Extension<AppState>,
) -> AppResult<Json<serde_json::Value>> {
    let stats = state.db.with_conn(crate::db::runs::stats).await?;
    let agents: serde_json::Map<String, serde_json::Value> = stats
        .agent_counts
        .into_iter()
        .map(|(name, count)| (name, json!(count)))
        .collect();

    Ok(Json(json!({
        "total_runs": stats.total_runs,
        "agents": agents,
        "recent_24h": stats.recent_24h,
        "performance": {
            "db_path": config::DB_PATH.display().to_string(),
            "journal_mode": state.db.journal_mode(),
        },
    })))
}
