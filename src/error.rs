use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// The error taxonomy from spec.md §7, collapsed onto a single enum in
/// the teacher's `AppError` shape: one type, one `IntoResponse` impl,
/// every internal failure source wired in via `#[from]`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("storage error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("validation error")]
    Validation(Value),
    #[error("rate limited")]
    RateLimited { limit: u32 },
    #[error("{0}")]
    Message(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(detail) => {
                tracing::warn!(error_type = "validation", detail = ?detail, "request rejected");
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": detail }))).into_response()
            }
            AppError::RateLimited { limit } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "detail": "rate limit exceeded" })),
                )
                    .into_response();
                let headers = response.headers_mut();
                headers.insert(axum::http::header::RETRY_AFTER, "60".parse().unwrap());
                headers.insert("x-ratelimit-limit", limit.to_string().parse().unwrap());
                headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
                response
            }
            other => {
                let status = match &other {
                    AppError::NotFound => StatusCode::NOT_FOUND,
                    AppError::Unauthorized => StatusCode::UNAUTHORIZED,
                    AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
                    AppError::Db(_) | AppError::Io(_) | AppError::Message(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    AppError::Validation(_) | AppError::RateLimited { .. } => unreachable!(),
                };
                tracing::error!(error = ?other, "request failed");
                (status, Json(json!({ "detail": other.to_string() }))).into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
