//! Optional bearer-token auth (spec.md §4.5.2). `/health` and
//! `/api/v1/metadata` never require auth; every other route does when
//! `TELEMETRY_API_AUTH_ENABLED` is set. Modeled as a `FromRequestParts`
//! extractor, the teacher's `extractor::AuthUser` shape, minus the JWT
//! machinery this service doesn't need — a single configured bearer
//! token is the whole credential.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use crate::config;

pub struct Authenticated;

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if !*config::API_AUTH_ENABLED {
            return Ok(Authenticated);
        }

        let expected = config::API_AUTH_TOKEN
            .as_deref()
            .ok_or((StatusCode::UNAUTHORIZED, "auth misconfigured"))?;

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing bearer token"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or((StatusCode::UNAUTHORIZED, "malformed authorization header"))?;

        if token != expected {
            return Err((StatusCode::UNAUTHORIZED, "invalid bearer token"));
        }

        Ok(Authenticated)
    }
}
