use crate::client::{buffer, BufferedRequest};
use crate::config;

/// One cooperative background task per client process (spec.md §9): on
/// a fixed interval, replays every file in the failover buffer against
/// the Ingestion API and removes it on success. Because every buffered
/// request carries the same `event_id` it was created with, the server
/// absorbs a replay idempotently even if it already saw the original
/// attempt.
///
/// Each buffered request gets its own bounded exponential backoff
/// within a sweep (not across sweeps): failures are retried a few times
/// immediately, then left for the next sweep rather than blocking the
/// worker on one stuck file.
pub fn spawn(http: reqwest::Client, base_url: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(*config::CLIENT_SYNC_INTERVAL_SECS);
        loop {
            sweep(&http, &base_url).await;
            tokio::time::sleep(interval).await;
        }
    })
}

async fn sweep(http: &reqwest::Client, base_url: &str) {
    for path in buffer::pending() {
        let event = match buffer::read(&path) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(?err, path = %path.display(), "unreadable buffer file; leaving for next sweep");
                continue;
            }
        };
        let Ok(request) = serde_json::from_value::<BufferedRequest>(event) else {
            tracing::warn!(path = %path.display(), "malformed buffer file; leaving for next sweep");
            continue;
        };

        if replay_with_backoff(http, base_url, &request).await {
            buffer::remove(&path);
        }
    }
}

const RETRY_SCHEDULE_MS: [u64; 3] = [200, 500, 1000];

async fn replay_with_backoff(http: &reqwest::Client, base_url: &str, request: &BufferedRequest) -> bool {
    let url = format!("{base_url}{}", request.path);
    for delay_ms in RETRY_SCHEDULE_MS {
        let attempt = match request.method.as_str() {
            "PATCH" => http.patch(&url).json(&request.body).send().await,
            _ => http.post(&url).json(&request.body).send().await,
        };
        match attempt {
            Ok(resp) if resp.status().is_success() => return true,
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), url, "buffered replay rejected");
            }
            Err(err) => {
                tracing::warn!(?err, url, "buffered replay failed; API likely still unavailable");
                return false;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn buffered_request_round_trips_through_json() {
        let request = BufferedRequest {
            method: "PATCH".to_string(),
            path: "/api/v1/runs/e1".to_string(),
            body: json!({"status": "success"}),
        };
        let value = serde_json::to_value(&request).unwrap();
        let back: BufferedRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back.method, "PATCH");
        assert_eq!(back.path, "/api/v1/runs/e1");
    }
}
