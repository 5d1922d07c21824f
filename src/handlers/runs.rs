use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Authenticated;
use crate::error::{AppError, AppResult};
use crate::model::{InsertOutcome, NewRun, Patch, RunQuery};
use crate::state::AppState;
use crate::urlbuilder;
use crate::validate;

/// `POST /api/v1/runs` — create one run; idempotent on `event_id`
/// (spec.md §4.5.1).
pub async fn create(
    _auth: Authenticated,
    Extension(state): Extension<AppState>,
    Json(record): Json<NewRun>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if let Err(errors) = validate::validate_new_run(&record) {
        return Err(AppError::Validation(validate::errors_to_json(errors)));
    }

    let event_id = record.event_id.clone();
    let run_id = record.run_id.clone();
    let outcome = state
        .db
        .with_conn(move |conn| crate::db::runs::insert_run(conn, &record))
        .await?;

    tracing::info!(%event_id, %run_id, outcome = ?outcome, "run created");

    match outcome {
        InsertOutcome::Created => Ok((
            StatusCode::CREATED,
            Json(json!({ "status": "created", "event_id": event_id, "run_id": run_id })),
        )),
        InsertOutcome::Duplicate => Ok((
            StatusCode::OK,
            Json(json!({ "status": "duplicate", "event_id": event_id })),
        )),
    }
}

/// `POST /api/v1/runs/batch` — bulk create; per-record error capture;
/// never a 4xx/5xx for partial failure (spec.md §4.1, §4.5.1).
pub async fn batch_create(
    _auth: Authenticated,
    Extension(state): Extension<AppState>,
    Json(records): Json<Vec<NewRun>>,
) -> AppResult<Json<Value>> {
    let total = records.len();
    let mut to_insert = Vec::with_capacity(total);
    let mut pre_validation_errors = Vec::new();

    for record in records {
        match validate::validate_new_run(&record) {
            Ok(()) => to_insert.push(record),
            Err(errors) => pre_validation_errors.push(crate::model::BatchError {
                event_id: record.event_id.clone(),
                detail: errors
                    .into_iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
        }
    }

    let mut result = state
        .db
        .with_conn_mut(move |conn| crate::db::runs::batch_insert(conn, &to_insert))
        .await?;

    result.errors.extend(pre_validation_errors);
    result.total = total;

    tracing::info!(
        inserted = result.inserted,
        duplicates = result.duplicates,
        errors = result.errors.len(),
        total,
        "batch insert complete"
    );

    Ok(Json(serde_json::to_value(result).expect("BatchResult serializes")))
}

/// `PATCH /api/v1/runs/{event_id}` — partial update (spec.md §4.1,
/// §4.5.1).
pub async fn update(
    _auth: Authenticated,
    Extension(state): Extension<AppState>,
    Path(event_id): Path<String>,
    Json(patch): Json<Patch>,
) -> AppResult<Json<Value>> {
    let has_settable = patch
        .keys()
        .any(|k| crate::model::SETTABLE_COLUMNS.contains(&k.as_str()));
    if !has_settable {
        return Err(AppError::BadRequest(
            "patch contains no settable fields".to_string(),
        ));
    }

    let event_id_for_db = event_id.clone();
    let result = state
        .db
        .with_conn(move |conn| crate::db::runs::update_fields(conn, &event_id_for_db, &patch))
        .await?;

    match result {
        None => Err(AppError::NotFound),
        Some(fields_updated) => {
            tracing::info!(%event_id, fields = ?fields_updated, "run updated");
            Ok(Json(json!({
                "event_id": event_id,
                "updated": true,
                "fields_updated": fields_updated,
            })))
        }
    }
}

/// `GET /api/v1/runs/{event_id}` — direct O(1) fetch. Must be registered
/// before the listing route for correct path matching (spec.md §4.5.1,
/// §9).
pub async fn get_by_id(
    _auth: Authenticated,
    Extension(state): Extension<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<Json<crate::model::Run>> {
    let run = state
        .db
        .with_conn(move |conn| crate::db::runs::fetch_by_event_id(conn, &event_id))
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(run))
}

#[derive(Deserialize)]
pub struct RunListParams {
    pub agent_name: Option<String>,
    pub status: Option<String>,
    pub job_type: Option<String>,
    pub created_after: Option<chrono::DateTime<chrono::Utc>>,
    pub created_before: Option<chrono::DateTime<chrono::Utc>>,
    pub start_after: Option<chrono::DateTime<chrono::Utc>>,
    pub start_before: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `GET /api/v1/runs` — filter/paginate (spec.md §4.1, §4.5.1, §4.5.3).
pub async fn list(
    _auth: Authenticated,
    Extension(state): Extension<AppState>,
    Query(params): Query<RunListParams>,
) -> AppResult<Json<Vec<crate::model::Run>>> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let offset = params.offset.unwrap_or(0).max(0);

    let filter = RunQuery {
        agent_name: params.agent_name,
        status: params.status,
        job_type: params.job_type,
        created_after: params.created_after,
        created_before: params.created_before,
        start_after: params.start_after,
        start_before: params.start_before,
        limit,
        offset,
    };

    let mut runs = state
        .db
        .with_conn(move |conn| crate::db::runs::query(conn, &filter))
        .await?;

    // spec.md §4.1 step 5: each listed row carries its derived
    // `commit_url`/`repo_url`, computed the same way the dedicated
    // endpoints compute them.
    for run in &mut runs {
        run.repo_url = run.git_repo.as_deref().and_then(urlbuilder::normalize_repo);
        run.commit_url = match (&run.git_repo, &run.git_commit_hash) {
            (Some(repo), Some(hash)) => urlbuilder::build_commit_url(repo, hash),
            _ => None,
        };
    }

    tracing::info!(result_count = runs.len(), "runs queried");
    Ok(Json(runs))
}

/// `GET /api/v1/runs/{event_id}/commit-url` (spec.md §4.5.1, §4.4).
pub async fn commit_url(
    _auth: Authenticated,
    Extension(state): Extension<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<Json<Value>> {
    let run = state
        .db
        .with_conn(move |conn| crate::db::runs::fetch_by_event_id(conn, &event_id))
        .await?
        .ok_or(AppError::NotFound)?;

    let url = match (&run.git_repo, &run.git_commit_hash) {
        (Some(repo), Some(hash)) => urlbuilder::build_commit_url(repo, hash),
        _ => None,
    };
    Ok(Json(json!({ "commit_url": url })))
}

/// `GET /api/v1/runs/{event_id}/repo-url` (spec.md §4.5.1, §4.4).
pub async fn repo_url(
    _auth: Authenticated,
    Extension(state): Extension<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<Json<Value>> {
    let run = state
        .db
        .with_conn(move |conn| crate::db::runs::fetch_by_event_id(conn, &event_id))
        .await?
        .ok_or(AppError::NotFound)?;

    let url = run
        .git_repo
        .as_deref()
        .and_then(urlbuilder::normalize_repo);
    Ok(Json(json!({ "repo_url": url })))
}

#[derive(Deserialize)]
pub struct AssociateCommitRequest {
    pub git_commit_hash: String,
    pub git_commit_source: String,
    #[serde(default)]
    pub git_commit_author: Option<String>,
    #[serde(default)]
    pub git_commit_timestamp: Option<String>,
    #[serde(default)]
    pub git_repo: Option<String>,
}

/// `POST /api/v1/runs/{event_id}/associate-commit` — overwrites
/// `git_commit_*` fields; 404 if missing (spec.md §4.5.1, §3.1).
pub async fn associate_commit(
    _auth: Authenticated,
    Extension(state): Extension<AppState>,
    Path(event_id): Path<String>,
    Json(body): Json<AssociateCommitRequest>,
) -> AppResult<Json<Value>> {
    if let Err(reason) = validate::validate_commit_hash(&body.git_commit_hash) {
        return Err(AppError::Validation(
            json!([{ "field": "git_commit_hash", "message": reason }]),
        ));
    }
    if !matches!(body.git_commit_source.as_str(), "manual" | "llm" | "ci") {
        return Err(AppError::Validation(
            json!([{ "field": "git_commit_source", "message": "must be one of manual, llm, ci" }]),
        ));
    }

    let event_id_for_db = event_id.clone();
    let updated = state
        .db
        .with_conn_mut(move |conn| {
            crate::db::runs::associate_commit(
                conn,
                &event_id_for_db,
                &body.git_commit_hash,
                &body.git_commit_source,
                body.git_commit_author.as_deref(),
                body.git_commit_timestamp.as_deref(),
                body.git_repo.as_deref(),
            )
        })
        .await?;

    if !updated {
        return Err(AppError::NotFound);
    }

    Ok(Json(json!({ "status": "success", "event_id": event_id })))
}
