use crate::db::Db;
use crate::ratelimit::RateLimiter;
use std::sync::Arc;

/// Shared state threaded through every handler via `Extension`, the
/// teacher's `Extension(pool)` pattern generalized to the handful of
/// process-wide services the ingestion API needs.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub rate_limiter: Arc<RateLimiter>,
}
