use serde_json::{json, Value};

use crate::config;

const RETRY_SCHEDULE_SECS: [u64; 3] = [1, 2, 4];

/// Fires a best-effort POST to the configured external mirror sink on
/// `end_run` only (spec.md §4.6.6). Spawned so the caller never waits on
/// it; the bounded schedule (1s, 2s, 4s) caps how long the background
/// task itself runs, not the caller. Never treated as authoritative
/// (spec.md §9 open question: external mirror is a best-effort shadow).
/// `api_posted`/`api_retry_count` live on the Ingestion API's own record,
/// so success and failure are both reported back to the API over the
/// same HTTP client the rest of the pipeline uses, via `PATCH
/// /api/v1/runs/{event_id}` — not a direct database write, since this
/// runs inside the agent process, not the service.
pub fn spawn(http: reqwest::Client, base_url: String, event_id: String, payload: Value) {
    if !*config::EXTERNAL_MIRROR_ENABLED {
        return;
    }
    let Some(mirror_url) = config::EXTERNAL_MIRROR_URL.clone() else {
        tracing::warn!("external mirror enabled but no URL configured; skipping");
        return;
    };
    let token = config::EXTERNAL_MIRROR_TOKEN.clone();

    tokio::spawn(async move {
        for (attempt, delay_secs) in RETRY_SCHEDULE_SECS.iter().enumerate() {
            let mut request = http.post(&mirror_url).json(&payload);
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    report_posted(&http, &base_url, &event_id).await;
                    return;
                }
                Ok(resp) => {
                    tracing::warn!(
                        event_id = %event_id,
                        attempt,
                        status = resp.status().as_u16(),
                        "external mirror post rejected"
                    );
                }
                Err(err) => {
                    tracing::warn!(event_id = %event_id, attempt, ?err, "external mirror post failed");
                }
            }
            report_retry(&http, &base_url, &event_id, attempt as i64 + 1).await;
            tokio::time::sleep(std::time::Duration::from_secs(*delay_secs)).await;
        }
        tracing::warn!(event_id = %event_id, "external mirror exhausted its retry schedule");
    });
}

async fn report_posted(http: &reqwest::Client, base_url: &str, event_id: &str) {
    let url = format!("{base_url}/api/v1/runs/{event_id}");
    let body = json!({
        "api_posted": true,
        "api_posted_at": chrono::Utc::now().to_rfc3339(),
    });
    if let Err(err) = http.patch(&url).json(&body).send().await {
        tracing::warn!(?err, event_id, "failed to report mirror success back to ingestion API");
    }
}

async fn report_retry(http: &reqwest::Client, base_url: &str, event_id: &str, attempt: i64) {
    let url = format!("{base_url}/api/v1/runs/{event_id}");
    let body = json!({ "api_retry_count": attempt });
    if let Err(err) = http.patch(&url).json(&body).send().await {
        tracing::warn!(?err, event_id, "failed to report mirror retry back to ingestion API");
    }
}
