//! The agent-facing client library: everything an agent process links
//! against to record its own runs. Every public entrypoint here catches
//! its own failures and never raises to the caller, except the scope
//! guard's body re-raise (see [`pipeline::RunScope`]).

pub mod buffer;
pub mod eventlog;
pub mod mirror;
pub mod pipeline;
pub mod registry;
pub mod run_id;
pub mod sync_worker;

pub use pipeline::{Client, RunScope};
pub use run_id::get_run_id_metrics;

use serde::{Deserialize, Serialize};

/// A buffered HTTP call, replayed verbatim by the sync worker. Stored as
/// the literal file contents under `buffer/` (spec.md §4.6.5) — the
/// buffer doesn't need to understand `start_run` vs `end_run`, only
/// "POST/PATCH this body to this path again".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BufferedRequest {
    pub method: String,
    pub path: String,
    pub body: serde_json::Value,
}
