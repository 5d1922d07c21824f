use once_cell::sync::Lazy;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::config;

/// Serializes appends to today's file within a process (spec.md §5
/// "concurrent appends within a process are serialized by an in-process
/// lock to preserve line integrity"). One lock for the whole log rather
/// than per-file, since only one file is ever hot at a time.
static APPEND_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Appends one JSON line to `raw/events_YYYYMMDD.ndjson` for the current
/// UTC day. This is the disaster-recovery record: it is attempted on
/// every pipeline path and its own failure is only ever logged, never
/// propagated (spec.md §4.6.5).
pub fn append(event: &Value) {
    let _guard = APPEND_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Err(err) = append_inner(event) {
        tracing::error!(?err, "failed to append event-log line");
    }
}

fn append_inner(event: &Value) -> std::io::Result<()> {
    std::fs::create_dir_all(&*config::RAW_DIR)?;
    let filename = format!("events_{}.ndjson", chrono::Utc::now().format("%Y%m%d"));
    let path = config::RAW_DIR.join(filename);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    file.write_all(line.as_bytes())?;
    Ok(())
}
