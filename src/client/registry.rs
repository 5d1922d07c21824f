use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Snapshot of a run while it is open, keyed by `event_id`. Holds just
/// enough to service `log_event` and to build the `end_run` record
/// without re-asking the caller for identity fields.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub event_id: String,
    pub run_id: String,
    pub agent_name: String,
    pub job_type: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

/// The active-run registry (spec.md §4.6.2): only currently open runs
/// live here. Global because every `Client` in a process shares one
/// view of "what's in flight", the same way the single-writer guard and
/// rate limiter are process-wide by necessity.
static REGISTRY: Lazy<Arc<DashMap<String, RunRecord>>> = Lazy::new(|| Arc::new(DashMap::new()));

pub fn insert(record: RunRecord) {
    REGISTRY.insert(record.event_id.clone(), record);
}

pub fn remove(event_id: &str) -> Option<RunRecord> {
    REGISTRY.remove(event_id).map(|(_, v)| v)
}

pub fn get(event_id: &str) -> Option<RunRecord> {
    REGISTRY.get(event_id).map(|r| r.clone())
}

/// Whether `run_id` already belongs to an open run, for collision repair
/// in [`crate::client::run_id::resolve`].
pub fn run_id_is_active(run_id: &str) -> bool {
    REGISTRY.iter().any(|entry| entry.run_id == run_id)
}

#[cfg(test)]
pub fn len() -> usize {
    REGISTRY.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_remove_clears_entry() {
        let event_id = format!("test-registry-{}", uuid::Uuid::new_v4());
        insert(RunRecord {
            event_id: event_id.clone(),
            run_id: "r1".to_string(),
            agent_name: "a".to_string(),
            job_type: "j".to_string(),
            start_time: chrono::Utc::now(),
        });
        assert!(get(&event_id).is_some());
        let removed = remove(&event_id);
        assert!(removed.is_some());
        assert!(get(&event_id).is_none());
    }

    #[test]
    fn remove_missing_key_is_none_not_panic() {
        assert!(remove("does-not-exist").is_none());
    }
}
