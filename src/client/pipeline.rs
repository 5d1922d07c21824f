use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::client::{buffer, eventlog, mirror, registry, run_id, sync_worker, BufferedRequest};
use crate::config;

/// Guards against spawning more than one background sync worker per
/// process — every [`Client`] in a process shares the same failover
/// buffer directory, so one sweeper is enough (spec.md §9 "one
/// cooperative background task per client process").
static SYNC_WORKER_STARTED: AtomicBool = AtomicBool::new(false);

/// The agent-facing handle. Cheap to clone; wraps one `reqwest::Client`
/// and the configured base URL of the Ingestion API this process talks
/// to. Every public method here swallows its own failures — see
/// spec.md §4.6.7 `INV-never-raise-to-agent`.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Default for Client {
    fn default() -> Self {
        Client::new(config::CLIENT_API_BASE_URL.clone())
    }
}

impl Client {
    /// Constructs a client pointed at `base_url` and, the first time any
    /// `Client` is constructed in this process, spawns the background
    /// sync worker that drains the failover buffer (spec.md §4.6.5).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let http = reqwest::Client::new();

        if SYNC_WORKER_STARTED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            sync_worker::spawn(http.clone(), base_url.clone());
        }

        Client { http, base_url }
    }

    /// Starts tracking a run: resolves/validates `run_id`, registers it
    /// as active, and dual-writes the `start_run` record. Never raises;
    /// the run is registered even if both the API write and the buffer
    /// enqueue fail, since the event-log line is always attempted last
    /// as the final fallback record.
    pub async fn start_run(
        &self,
        agent_name: impl Into<String>,
        job_type: impl Into<String>,
        custom_run_id: Option<&str>,
    ) -> (String, String) {
        let agent_name = agent_name.into();
        let job_type = job_type.into();
        let resolved_run_id = run_id::resolve(&agent_name, custom_run_id);
        let event_id = uuid::Uuid::new_v4().to_string();
        let start_time = chrono::Utc::now();

        registry::insert(registry::RunRecord {
            event_id: event_id.clone(),
            run_id: resolved_run_id.clone(),
            agent_name: agent_name.clone(),
            job_type: job_type.clone(),
            start_time,
        });

        let body = json!({
            "event_id": event_id,
            "run_id": resolved_run_id,
            "agent_name": agent_name,
            "job_type": job_type,
            "start_time": start_time.to_rfc3339(),
            "status": "running",
        });

        eventlog::append(&json!({"kind": "start_run", "body": &body}));
        self.dual_write_post("/api/v1/runs", body).await;

        (event_id, resolved_run_id)
    }

    /// Ends a run: removes the registry entry (a missing key is a
    /// logged warning, never a panic) and dual-writes the terminal
    /// patch, then fires the external mirror.
    pub async fn end_run(
        &self,
        event_id: &str,
        status: &str,
        error_summary: Option<&str>,
        metrics_json: Option<Value>,
    ) {
        let Some(record) = registry::remove(event_id) else {
            tracing::warn!(event_id, "end_run called for an id not in the active registry");
            return;
        };

        let end_time = chrono::Utc::now();
        let duration_ms = (end_time - record.start_time).num_milliseconds().max(0);

        let mut patch = json!({
            "status": status,
            "end_time": end_time.to_rfc3339(),
            "duration_ms": duration_ms,
        });
        if let Some(summary) = error_summary {
            patch["error_summary"] = json!(summary);
        }
        if let Some(metrics) = metrics_json {
            patch["metrics_json"] = metrics;
        }

        eventlog::append(&json!({"kind": "end_run", "event_id": event_id, "body": &patch}));
        let path = format!("/api/v1/runs/{event_id}");
        self.dual_write_patch(&path, patch.clone()).await;

        mirror::spawn(
            self.http.clone(),
            self.base_url.clone(),
            event_id.to_string(),
            json!({
                "event_id": event_id,
                "run_id": record.run_id,
                "agent_name": record.agent_name,
                "job_type": record.job_type,
                "status": status,
            }),
        );
    }

    /// Writes only to the event log, never the API or the buffer, to
    /// avoid write amplification on chatty agents (spec.md §4.6.5).
    pub fn log_event(&self, event_id: &str, name: &str, detail: Option<Value>) {
        eventlog::append(&json!({
            "kind": "log_event",
            "event_id": event_id,
            "name": name,
            "detail": detail,
            "at": chrono::Utc::now().to_rfc3339(),
        }));
    }

    /// Scope-guarded lifecycle (spec.md §4.6.3). Rust has no async
    /// `Drop`, so the context-manager shape becomes a higher-order
    /// function instead of a guard object: `start_run` happens before
    /// `body` runs, `end_run` happens after, on every path out of
    /// `body` including an `Err` return — which is then propagated to
    /// the caller unchanged, matching "re-raises after recording
    /// failure".
    pub async fn track_run<F, Fut, T, E>(
        &self,
        agent_name: impl Into<String>,
        job_type: impl Into<String>,
        custom_run_id: Option<&str>,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce(RunContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let (event_id, run_id) = self.start_run(agent_name, job_type, custom_run_id).await;
        let metrics: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let ctx = RunContext {
            client: self.clone(),
            event_id: event_id.clone(),
            run_id,
            metrics: metrics.clone(),
        };

        match body(ctx).await {
            Ok(value) => {
                let final_metrics = metrics.lock().unwrap_or_else(|p| p.into_inner()).clone();
                self.end_run(&event_id, "success", None, final_metrics).await;
                Ok(value)
            }
            Err(err) => {
                let summary = err.to_string();
                self.end_run(&event_id, "failure", Some(&summary), None).await;
                Err(err)
            }
        }
    }

    async fn dual_write_post(&self, path: &str, body: Value) {
        let url = format!("{}{path}", self.base_url);
        match self.http.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) if resp.status().is_client_error() => {
                tracing::warn!(status = resp.status().as_u16(), path, "ingestion API rejected write");
            }
            _ => self.buffer_request("POST", path, body),
        }
    }

    async fn dual_write_patch(&self, path: &str, body: Value) {
        let url = format!("{}{path}", self.base_url);
        match self.http.patch(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) if resp.status().is_client_error() => {
                tracing::warn!(status = resp.status().as_u16(), path, "ingestion API rejected write");
            }
            _ => self.buffer_request("PATCH", path, body),
        }
    }

    fn buffer_request(&self, method: &str, path: &str, body: Value) {
        let envelope = serde_json::to_value(BufferedRequest {
            method: method.to_string(),
            path: path.to_string(),
            body,
        })
        .unwrap_or(Value::Null);
        buffer::enqueue(&envelope);
    }
}

/// Handle passed into a [`Client::track_run`] body. Exposes `log_event`
/// and `set_metrics`; `run_id` is the resolved (possibly repaired) id
/// for this run.
pub struct RunContext {
    client: Client,
    event_id: String,
    pub run_id: String,
    metrics: Arc<Mutex<Option<Value>>>,
}

impl RunContext {
    pub fn log_event(&self, name: &str, detail: Option<Value>) {
        self.client.log_event(&self.event_id, name, detail);
    }

    pub fn set_metrics(&self, metrics: Value) {
        *self.metrics.lock().unwrap_or_else(|p| p.into_inner()) = Some(metrics);
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }
}

/// Retained for API symmetry with the spec's vocabulary; `track_run`'s
/// closure form is the primary entrypoint, this re-export lets callers
/// spell out the scope type in a signature.
pub type RunScope = RunContext;
