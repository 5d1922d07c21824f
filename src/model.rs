use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical status set. Aliases are folded into these six values by
/// [`crate::status::normalize`] before anything is written or matched
/// against in a query filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Running,
    Success,
    Failure,
    Partial,
    Timeout,
    Cancelled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Running => "running",
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Partial => "partial",
            Status::Timeout => "timeout",
            Status::Cancelled => "cancelled",
        }
    }

    pub fn from_canonical(s: &str) -> Option<Status> {
        match s {
            "running" => Some(Status::Running),
            "success" => Some(Status::Success),
            "failure" => Some(Status::Failure),
            "partial" => Some(Status::Partial),
            "timeout" => Some(Status::Timeout),
            "cancelled" => Some(Status::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitCommitSource {
    Manual,
    Llm,
    Ci,
}

impl GitCommitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GitCommitSource::Manual => "manual",
            GitCommitSource::Llm => "llm",
            GitCommitSource::Ci => "ci",
        }
    }

    pub fn from_str(s: &str) -> Option<GitCommitSource> {
        match s {
            "manual" => Some(GitCommitSource::Manual),
            "llm" => Some(GitCommitSource::Llm),
            "ci" => Some(GitCommitSource::Ci),
            _ => None,
        }
    }
}

/// Request body for `POST /api/v1/runs` and each element of a batch post.
///
/// `event_id` is the idempotency key; `run_id` is the application-level
/// identifier and is not unique.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRun {
    pub event_id: String,
    pub run_id: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub agent_name: String,
    pub job_type: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub items_discovered: Option<i64>,
    #[serde(default)]
    pub items_succeeded: Option<i64>,
    #[serde(default)]
    pub items_failed: Option<i64>,
    #[serde(default)]
    pub items_skipped: Option<i64>,
    #[serde(default)]
    pub input_summary: Option<String>,
    #[serde(default)]
    pub output_summary: Option<String>,
    #[serde(default)]
    pub error_summary: Option<String>,
    #[serde(default)]
    pub error_details: Option<String>,
    #[serde(default)]
    pub source_ref: Option<String>,
    #[serde(default)]
    pub target_ref: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub product_family: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub website_section: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub git_repo: Option<String>,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub git_commit_hash: Option<String>,
    #[serde(default)]
    pub git_run_tag: Option<String>,
    #[serde(default)]
    pub git_commit_source: Option<String>,
    #[serde(default)]
    pub git_commit_author: Option<String>,
    #[serde(default)]
    pub git_commit_timestamp: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub trigger_type: Option<String>,
    #[serde(default)]
    pub metrics_json: Option<Value>,
    #[serde(default)]
    pub context_json: Option<Value>,
    #[serde(default)]
    pub insight_id: Option<String>,
    #[serde(default)]
    pub parent_run_id: Option<String>,
}

/// A full stored run, as returned by fetch-by-id and by list queries.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub event_id: String,
    pub run_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub agent_name: String,
    pub job_type: String,
    pub status: String,
    pub duration_ms: Option<i64>,
    pub items_discovered: Option<i64>,
    pub items_succeeded: Option<i64>,
    pub items_failed: Option<i64>,
    pub items_skipped: Option<i64>,
    pub input_summary: Option<String>,
    pub output_summary: Option<String>,
    pub error_summary: Option<String>,
    pub error_details: Option<String>,
    pub source_ref: Option<String>,
    pub target_ref: Option<String>,
    pub product: Option<String>,
    pub product_family: Option<String>,
    pub platform: Option<String>,
    pub subdomain: Option<String>,
    pub website: Option<String>,
    pub website_section: Option<String>,
    pub item_name: Option<String>,
    pub git_repo: Option<String>,
    pub git_branch: Option<String>,
    pub git_commit_hash: Option<String>,
    pub git_run_tag: Option<String>,
    pub git_commit_source: Option<String>,
    pub git_commit_author: Option<String>,
    pub git_commit_timestamp: Option<String>,
    pub host: Option<String>,
    pub environment: Option<String>,
    pub trigger_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_json_parse_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_json_parse_error: Option<String>,
    pub api_posted: bool,
    pub api_posted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub api_retry_count: i64,
    pub insight_id: Option<String>,
    pub parent_run_id: Option<String>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Derived via URL Builder; only populated by the listing query
    /// (spec.md §4.1 step 5), `None` elsewhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
}

/// Outcome of [`crate::db::runs::insert_run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertOutcome {
    Created,
    Duplicate,
}

/// Per-record outcome of a batch insert, shaped for the `errors[]` array
/// in the batch-create response.
#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    pub event_id: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub inserted: usize,
    pub duplicates: usize,
    pub errors: Vec<BatchError>,
    pub total: usize,
}

/// A filter row applied by the query handler. All fields are optional;
/// only non-null fields contribute a predicate (the "dynamic-predicate
/// core" of spec.md §4.5.3).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunQuery {
    pub agent_name: Option<String>,
    pub status: Option<String>,
    pub job_type: Option<String>,
    pub created_after: Option<chrono::DateTime<chrono::Utc>>,
    pub created_before: Option<chrono::DateTime<chrono::Utc>>,
    pub start_after: Option<chrono::DateTime<chrono::Utc>>,
    pub start_before: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

/// Partial-update patch for `PATCH /api/v1/runs/{event_id}`. Every field
/// is wrapped in an outer `Option` via presence-tracking at the JSON
/// layer (see [`crate::handlers::runs::update`]): a field absent from the
/// request body is left untouched, while a field present with JSON
/// `null` clears the column.
pub type Patch = std::collections::HashMap<String, Value>;

/// Columns that may never appear in a patch, per spec.md §4.1: "`event_id`
/// and `run_id` are never in the settable set."
pub const IMMUTABLE_COLUMNS: &[&str] = &["event_id", "run_id", "created_at"];

/// All columns that partial update is allowed to touch.
pub const SETTABLE_COLUMNS: &[&str] = &[
    "start_time",
    "end_time",
    "agent_name",
    "job_type",
    "status",
    "duration_ms",
    "items_discovered",
    "items_succeeded",
    "items_failed",
    "items_skipped",
    "input_summary",
    "output_summary",
    "error_summary",
    "error_details",
    "source_ref",
    "target_ref",
    "product",
    "product_family",
    "platform",
    "subdomain",
    "website",
    "website_section",
    "item_name",
    "git_repo",
    "git_branch",
    "git_commit_hash",
    "git_run_tag",
    "git_commit_source",
    "git_commit_author",
    "git_commit_timestamp",
    "host",
    "environment",
    "trigger_type",
    "metrics_json",
    "context_json",
    "api_posted",
    "api_posted_at",
    "api_retry_count",
    "insight_id",
    "parent_run_id",
];
