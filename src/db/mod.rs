//! Storage engine (spec.md §4.1).
//!
//! `rusqlite::Connection` is synchronous and not `Sync`; the engine owns
//! one connection behind a `std::sync::Mutex` and every operation runs
//! inside `tokio::task::spawn_blocking`. This is the async-Rust
//! rendering of "single connection serves the process; writes are
//! serialized by the single-writer guard rather than per-statement
//! locking" — the blocking mutex *is* the serialization point, matching
//! the teacher's pattern of shunting blocking work (`bollard`, `git2`)
//! behind dedicated async wrappers rather than reaching for a pool.

pub mod migrations;
pub mod runs;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const MIN_SCHEMA_VERSION: i64 = 1;

#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (creating parent directories if needed), apply the required
    /// PRAGMAs, and run migrations up to the latest known version.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(e.to_string()),
                )
            })?;
        }
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        migrations::run(&conn)?;
        let version = migrations::current_version(&conn)?;
        if version < MIN_SCHEMA_VERSION {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_SCHEMA),
                Some(format!(
                    "schema version {version} is older than the minimum supported version {MIN_SCHEMA_VERSION}"
                )),
            ));
        }
        Ok(Db {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        migrations::run(&conn)?;
        Ok(Db {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection on the blocking
    /// thread pool. All public storage operations funnel through this.
    pub async fn with_conn<F, T>(&self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("storage mutex poisoned");
            f(&guard)
        })
        .await
        .expect("blocking storage task panicked")
    }

    /// As [`Db::with_conn`], but for operations (batch insert, associate
    /// commit, retention delete) that need `&mut Connection` to open a
    /// transaction.
    pub async fn with_conn_mut<F, T>(&self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().expect("storage mutex poisoned");
            f(&mut guard)
        })
        .await
        .expect("blocking storage task panicked")
    }

    pub fn journal_mode(&self) -> String {
        let guard = self.conn.lock().expect("storage mutex poisoned");
        guard
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn synchronous(&self) -> String {
        let guard = self.conn.lock().expect("storage mutex poisoned");
        let value: i64 = guard
            .query_row("PRAGMA synchronous", [], |row| row.get(0))
            .unwrap_or(-1);
        match value {
            0 => "OFF".to_string(),
            1 => "NORMAL".to_string(),
            2 => "FULL".to_string(),
            3 => "EXTRA".to_string(),
            _ => "unknown".to_string(),
        }
    }

    /// Runs `PRAGMA integrity_check`; returns `true` iff the single row
    /// is `ok`.
    pub fn integrity_check(&self) -> rusqlite::Result<bool> {
        let guard = self.conn.lock().expect("storage mutex poisoned");
        let result: String =
            guard.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Online-backup the live database to `dest` using SQLite's native
    /// backup API (spec.md §4.8 step 3) — a consistent snapshot without
    /// stopping writers.
    pub fn backup_to(&self, dest: &Path) -> rusqlite::Result<()> {
        let guard = self.conn.lock().expect("storage mutex poisoned");
        let mut dest_conn = Connection::open(dest)?;
        let backup = rusqlite::backup::Backup::new(&guard, &mut dest_conn)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(50), None)
    }

    /// `VACUUM`. Requires exclusive access to the database file; callers
    /// (the retention controller) are responsible for sequencing this
    /// after writers have stopped.
    pub fn reclaim_space(&self) -> rusqlite::Result<()> {
        let guard = self.conn.lock().expect("storage mutex poisoned");
        guard.execute_batch("VACUUM;")
    }
}

fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    // `journal_mode` returns the resulting mode as a row; `pragma_update`
    // alone would error on that, so use the _and_check variant.
    conn.pragma_update_and_check(None, "journal_mode", "DELETE", |_row| Ok(()))?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.busy_timeout(std::time::Duration::from_secs(30))?;
    Ok(())
}
