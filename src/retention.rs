//! Retention controller (spec.md §4.7). Invoked out-of-band by a
//! scheduler, not by the HTTP server — it runs as the `runtrace-retention`
//! binary and takes the single-writer lock itself for the duration of
//! the batched delete + reclaim.

use serde::Serialize;
use std::path::Path;

use crate::db::Db;
use crate::singlewriter::SingleWriterGuard;

#[derive(Debug, Serialize)]
pub struct RetentionReport {
    pub dry_run: bool,
    pub cutoff: chrono::DateTime<chrono::Utc>,
    pub rows_before: i64,
    pub rows_deleted: i64,
    pub rows_after: i64,
    pub reclaimed_space: bool,
}

/// Runs one retention pass against `db_path`. Acquires the single-writer
/// lock itself (spec.md §4.7 step 1: "Acquire single-writer lock ... ")
/// for the duration of the pass, so this must not be run against a
/// database the `runtrace-server` process is currently holding open —
/// the lock acquisition will fail fast with a clear message instead of
/// corrupting anything.
pub async fn run(
    base_dir: &Path,
    db_path: &Path,
    days_to_keep: i64,
    batch_size: i64,
    dry_run: bool,
) -> Result<RetentionReport, String> {
    let _guard = SingleWriterGuard::acquire(base_dir)?;

    let db = Db::open(db_path).map_err(|e| e.to_string())?;
    let cutoff = chrono::Utc::now() - chrono::Duration::days(days_to_keep);

    let before = db
        .with_conn(crate::db::runs::retention_stats)
        .await
        .map_err(|e| e.to_string())?;

    let rows_deleted = db
        .with_conn_mut(move |conn| crate::db::runs::delete_older_than(conn, cutoff, batch_size, dry_run))
        .await
        .map_err(|e| e.to_string())?;

    let reclaimed_space = if !dry_run && rows_deleted > 0 {
        db.reclaim_space().map_err(|e| e.to_string())?;
        true
    } else {
        false
    };

    let after = db
        .with_conn(crate::db::runs::retention_stats)
        .await
        .map_err(|e| e.to_string())?;

    Ok(RetentionReport {
        dry_run,
        cutoff,
        rows_before: before.row_count,
        rows_deleted,
        rows_after: after.row_count,
        reclaimed_space,
    })
}
