use axum::{extract::Extension, Json};
use serde_json::json;

use crate::error::AppResult;
use crate::state::AppState;

/// `GET /api/v1/metadata` — distinct agent names / job types, never
/// requires auth (spec.md §4.5.1, §4.5.2).
pub async fn metadata(Extension(state): Extension<AppState>) -> AppResult<Json<serde_json::Value>> {
    let agent_names = state
        .db
        .with_conn(|conn| crate::db::runs::distinct_values(conn, "agent_name"))
        .await?;
    let job_types = state
        .db
        .with_conn(|conn| crate::db::runs::distinct_values(conn, "job_type"))
        .await?;
    let stats = state.db.with_conn(crate::db::runs::stats).await?;

    Ok(Json(json!({
        "agent_names": agent_names,
        "job_types": job_types,
        "counts": {
            "total_runs": stats.total_runs,
        },
    })))
}
