//! Backup/restore controller (spec.md §4.8). Runs as the
//! `runtrace-backup` binary; `backup()` can run alongside a live
//! `runtrace-server` process (it uses the storage engine's online-backup
//! API), `restore()` cannot and expects the caller to have stopped the
//! service first.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config;
use crate::db::Db;

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub timestamp: String,
    pub size_bytes: u64,
    pub verified: bool,
    pub method: String,
}

#[derive(Debug, Serialize)]
pub struct BackupReport {
    pub backup_dir: PathBuf,
    pub metadata: BackupMetadata,
    pub pruned_dirs: Vec<PathBuf>,
}

const IO_RETRY_ATTEMPTS: u32 = 3;

/// Runs one backup pass against `db_path`, writing into
/// `{backup_root}/{YYYYMMDD_HHMMSS}/`.
pub fn run(db_path: &Path, backup_root: &Path, min_free_bytes: u64, retention_days: i64) -> Result<BackupReport, String> {
    check_free_space(backup_root, min_free_bytes)?;

    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let backup_dir = backup_root.join(&stamp);
    std::fs::create_dir_all(&backup_dir).map_err(|e| e.to_string())?;
    let dest = backup_dir.join("telemetry.sqlite");

    let db = Db::open(db_path).map_err(|e| e.to_string())?;
    copy_with_retries(&db, &dest)?;

    let restore_db = Db::open(&dest).map_err(|e| e.to_string())?;
    let verified = restore_db.integrity_check().map_err(|e| e.to_string())?;
    if !verified {
        return Err(format!("backup at {} failed integrity check", dest.display()));
    }

    let size_bytes = std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);
    let metadata = BackupMetadata {
        timestamp: stamp,
        size_bytes,
        verified,
        method: "sqlite_online_backup".to_string(),
    };
    let metadata_path = backup_dir.join("metadata.json");
    std::fs::write(&metadata_path, serde_json::to_vec_pretty(&metadata).map_err(|e| e.to_string())?)
        .map_err(|e| e.to_string())?;

    let pruned_dirs = prune_old_backups(backup_root, retention_days)?;

    Ok(BackupReport {
        backup_dir,
        metadata,
        pruned_dirs,
    })
}

fn copy_with_retries(db: &Db, dest: &Path) -> Result<(), String> {
    let mut last_err = None;
    for attempt in 0..IO_RETRY_ATTEMPTS {
        match db.backup_to(dest) {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!(attempt, ?err, "online backup attempt failed, retrying");
                last_err = Some(err.to_string());
            }
        }
    }
    Err(last_err.unwrap_or_else(|| "backup failed for an unknown reason".to_string()))
}

fn check_free_space(backup_root: &Path, min_free_bytes: u64) -> Result<(), String> {
    std::fs::create_dir_all(backup_root).map_err(|e| e.to_string())?;
    // `fs2` exposes free-space queries per-filesystem; this is the same
    // crate the single-writer guard already depends on for file locking.
    let free = fs2::available_space(backup_root).map_err(|e| e.to_string())?;
    if free < min_free_bytes {
        return Err(format!(
            "only {free} bytes free at {}, need at least {min_free_bytes}",
            backup_root.display()
        ));
    }
    Ok(())
}

fn prune_old_backups(backup_root: &Path, retention_days: i64) -> Result<Vec<PathBuf>, String> {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days);
    let mut pruned = Vec::new();
    let Ok(entries) = std::fs::read_dir(backup_root) else {
        return Ok(pruned);
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == "safety_backups" {
            continue;
        }
        let Ok(stamp) = chrono::NaiveDateTime::parse_from_str(name, "%Y%m%d_%H%M%S") else {
            continue;
        };
        let stamp_utc = chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(stamp, chrono::Utc);
        if stamp_utc < cutoff {
            if let Err(err) = std::fs::remove_dir_all(&path) {
                tracing::warn!(?err, path = %path.display(), "failed to prune old backup directory");
            } else {
                pruned.push(path);
            }
        }
    }
    Ok(pruned)
}

#[derive(Debug, Serialize)]
pub struct RestoreReport {
    pub safety_backup_dir: PathBuf,
    pub restored_from: PathBuf,
    pub verified_after_restore: bool,
}

/// Replaces the live database file with `source`. The caller is
/// responsible for having stopped `runtrace-server` (released the
/// single-writer lock) before calling this — the restore itself does
/// not manage that process lifecycle, since it has no handle to it.
pub fn restore(source: &Path, live_db_path: &Path, safety_backup_root: &Path) -> Result<RestoreReport, String> {
    if !source.exists() {
        return Err(format!("restore source {} does not exist", source.display()));
    }
    let source_db = Db::open(source).map_err(|e| e.to_string())?;
    if !source_db.integrity_check().map_err(|e| e.to_string())? {
        return Err(format!("restore source {} fails integrity check", source.display()));
    }
    drop(source_db);

    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let safety_dir = safety_backup_root.join(format!("pre_restore_{stamp}"));
    std::fs::create_dir_all(&safety_dir).map_err(|e| e.to_string())?;
    if live_db_path.exists() {
        std::fs::copy(live_db_path, safety_dir.join("telemetry.sqlite")).map_err(|e| e.to_string())?;
    }

    for sidecar_ext in ["-journal", "-wal", "-shm"] {
        let sidecar = PathBuf::from(format!("{}{sidecar_ext}", live_db_path.display()));
        if sidecar.exists() {
            let _ = std::fs::remove_file(&sidecar);
        }
    }
    std::fs::copy(source, live_db_path).map_err(|e| e.to_string())?;

    let restored_db = Db::open(live_db_path).map_err(|e| e.to_string())?;
    let verified_after_restore = restored_db.integrity_check().map_err(|e| e.to_string())?;

    if !verified_after_restore {
        tracing::error!(
            safety_backup = %safety_dir.display(),
            "restored database failed integrity check; rolling back to safety backup"
        );
        std::fs::copy(safety_dir.join("telemetry.sqlite"), live_db_path).map_err(|e| e.to_string())?;
    }

    Ok(RestoreReport {
        safety_backup_dir: safety_dir,
        restored_from: source.to_path_buf(),
        verified_after_restore,
    })
}

pub fn default_backup_root() -> PathBuf {
    config::BACKUP_DIR.clone()
}
