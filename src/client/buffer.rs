use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config;

/// Durable per-client failover queue (spec.md §4.6.5, §9 "Failover
/// buffer"): one JSON file per pending event, written to a `.tmp`
/// sibling and atomically renamed into place so the sync worker never
/// observes a half-written file.
pub fn enqueue(event: &Value) {
    if let Err(err) = enqueue_inner(event) {
        tracing::error!(?err, "failed to enqueue event into failover buffer");
    }
}

fn enqueue_inner(event: &Value) -> std::io::Result<()> {
    std::fs::create_dir_all(&*config::BUFFER_DIR)?;
    let name = format!("{}.json", Uuid::new_v4());
    let tmp_path = config::BUFFER_DIR.join(format!("{name}.tmp"));
    let final_path = config::BUFFER_DIR.join(&name);
    std::fs::write(&tmp_path, serde_json::to_vec(event)?)?;
    std::fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

/// Lists buffered events ready to retry. Files still ending in `.tmp`
/// are mid-write and are skipped.
pub fn pending() -> Vec<PathBuf> {
    let dir: &Path = &config::BUFFER_DIR;
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect()
}

pub fn read(path: &Path) -> std::io::Result<Value> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn remove(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(?err, path = %path.display(), "failed to remove drained buffer file");
        }
    }
}
