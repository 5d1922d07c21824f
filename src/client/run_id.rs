use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::client::registry;

enum RejectReason {
    Empty,
    TooLong,
    InvalidChars,
}

struct Counters {
    custom_accepted: AtomicU64,
    generated: AtomicU64,
    rejected_empty: AtomicU64,
    rejected_too_long: AtomicU64,
    rejected_invalid_chars: AtomicU64,
    duplicates_detected: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(|| Counters {
    custom_accepted: AtomicU64::new(0),
    generated: AtomicU64::new(0),
    rejected_empty: AtomicU64::new(0),
    rejected_too_long: AtomicU64::new(0),
    rejected_invalid_chars: AtomicU64::new(0),
    duplicates_detected: AtomicU64::new(0),
});

#[derive(Debug, Serialize)]
pub struct RejectedCounts {
    pub empty: u64,
    pub too_long: u64,
    pub invalid_chars: u64,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct RunIdMetrics {
    pub custom_accepted: u64,
    pub generated: u64,
    pub rejected: RejectedCounts,
    pub duplicates_detected: u64,
    pub total_runs: u64,
    pub custom_percentage: f64,
}

/// Thread-safe snapshot for the client's `get_run_id_metrics()` surface
/// (spec.md §4.6.4). Percentages are computed at read time, not stored.
pub fn get_run_id_metrics() -> RunIdMetrics {
    let custom_accepted = COUNTERS.custom_accepted.load(Ordering::Relaxed);
    let generated = COUNTERS.generated.load(Ordering::Relaxed);
    let rejected_empty = COUNTERS.rejected_empty.load(Ordering::Relaxed);
    let rejected_too_long = COUNTERS.rejected_too_long.load(Ordering::Relaxed);
    let rejected_invalid_chars = COUNTERS.rejected_invalid_chars.load(Ordering::Relaxed);
    let duplicates_detected = COUNTERS.duplicates_detected.load(Ordering::Relaxed);
    let total_runs = custom_accepted + generated;
    let custom_percentage = if total_runs == 0 {
        0.0
    } else {
        (custom_accepted as f64 / total_runs as f64) * 100.0
    };
    RunIdMetrics {
        custom_accepted,
        generated,
        rejected: RejectedCounts {
            empty: rejected_empty,
            too_long: rejected_too_long,
            invalid_chars: rejected_invalid_chars,
            total: rejected_empty + rejected_too_long + rejected_invalid_chars,
        },
        duplicates_detected,
        total_runs,
        custom_percentage,
    }
}

fn validate(candidate: &str) -> Result<(), RejectReason> {
    if candidate.trim().is_empty() {
        return Err(RejectReason::Empty);
    }
    if candidate.len() > 255 {
        return Err(RejectReason::TooLong);
    }
    if candidate.contains('/') || candidate.contains('\\') || candidate.contains('\0') {
        return Err(RejectReason::InvalidChars);
    }
    Ok(())
}

fn record_rejection(reason: &RejectReason) {
    match reason {
        RejectReason::Empty => COUNTERS.rejected_empty.fetch_add(1, Ordering::Relaxed),
        RejectReason::TooLong => COUNTERS.rejected_too_long.fetch_add(1, Ordering::Relaxed),
        RejectReason::InvalidChars => COUNTERS
            .rejected_invalid_chars
            .fetch_add(1, Ordering::Relaxed),
    };
}

/// Builds `{YYYYMMDD}T{HHMMSS}Z-{agent_name}-{uuid8}` (spec.md §3.1).
fn generate(agent_name: &str) -> String {
    COUNTERS.generated.fetch_add(1, Ordering::Relaxed);
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    format!("{stamp}-{agent_name}-{}", short_uuid())
}

/// Resolves the `run_id` a `start_run` call will actually use: validates
/// a custom candidate, falls back to a generated id on any rejection,
/// and repairs a collision with the active registry in either case
/// (spec.md §4.6.4). The returned id is never equal to a rejected
/// candidate.
pub fn resolve(agent_name: &str, custom: Option<&str>) -> String {
    let candidate = match custom {
        None => {
            let run_id = generate(agent_name);
            return dedupe_generated(agent_name, run_id);
        }
        Some(c) => c,
    };

    match validate(candidate) {
        Ok(()) => {
            COUNTERS.custom_accepted.fetch_add(1, Ordering::Relaxed);
            dedupe_custom(candidate.to_string())
        }
        Err(reason) => {
            record_rejection(&reason);
            let run_id = generate(agent_name);
            dedupe_generated(agent_name, run_id)
        }
    }
}

fn is_active(run_id: &str) -> bool {
    registry::run_id_is_active(run_id)
}

fn dedupe_custom(run_id: String) -> String {
    if !is_active(&run_id) {
        return run_id;
    }
    COUNTERS.duplicates_detected.fetch_add(1, Ordering::Relaxed);
    format!("{run_id}-duplicate-{}", short_uuid())
}

fn dedupe_generated(agent_name: &str, run_id: String) -> String {
    if !is_active(&run_id) {
        return run_id;
    }
    COUNTERS.duplicates_detected.fetch_add(1, Ordering::Relaxed);
    generate(agent_name)
}

fn short_uuid() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_candidate_falls_back_and_counts() {
        let before = get_run_id_metrics().rejected.empty;
        let resolved = resolve("agent", Some("   "));
        assert!(!resolved.is_empty());
        assert_ne!(resolved, "   ");
        assert_eq!(get_run_id_metrics().rejected.empty, before + 1);
    }

    #[test]
    fn too_long_candidate_falls_back_and_counts() {
        let candidate = "a".repeat(300);
        let before = get_run_id_metrics().rejected.too_long;
        let resolved = resolve("agent", Some(&candidate));
        assert_ne!(resolved, candidate);
        assert_eq!(get_run_id_metrics().rejected.too_long, before + 1);
    }

    #[test]
    fn invalid_chars_candidate_falls_back_and_counts() {
        let before = get_run_id_metrics().rejected.invalid_chars;
        let resolved = resolve("agent", Some("a/b"));
        assert_ne!(resolved, "a/b");
        assert_eq!(get_run_id_metrics().rejected.invalid_chars, before + 1);
    }

    #[test]
    fn valid_candidate_is_accepted_unchanged() {
        let candidate = format!("run-{}", Uuid::new_v4());
        let resolved = resolve("agent", Some(&candidate));
        assert_eq!(resolved, candidate);
    }

    #[test]
    fn generated_id_matches_spec_format() {
        let resolved = resolve("myagent", None);
        let parts: Vec<&str> = resolved.splitn(2, '-').collect();
        assert!(parts[0].ends_with('Z'));
        assert!(resolved.contains("myagent"));
    }
}
