use once_cell::sync::Lazy;
use std::path::PathBuf;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Root directory for all persisted state (spec.md §6.2). Auto-detected
/// as `./data` when unset, overridable via `TELEMETRY_BASE_DIR`.
pub static BASE_DIR: Lazy<PathBuf> =
    Lazy::new(|| PathBuf::from(env_or("TELEMETRY_BASE_DIR", "./data")));

/// Database file path. Defaults to `{base}/db/telemetry.sqlite`.
pub static DB_PATH: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("TELEMETRY_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| BASE_DIR.join("db").join("telemetry.sqlite"))
});

/// MUST be `DELETE` — the system runs on volumes that corrupt under WAL
/// (spec.md §4.1). A non-DELETE value is a startup warning, not a hard
/// failure, so operators can still diagnose a misconfigured environment.
pub static DB_JOURNAL_MODE: Lazy<String> =
    Lazy::new(|| env_or("TELEMETRY_DB_JOURNAL_MODE", "DELETE"));

/// MUST be `FULL` — the durability contract (spec.md §4.1). Non-FULL is
/// a startup error.
pub static DB_SYNCHRONOUS: Lazy<String> =
    Lazy::new(|| env_or("TELEMETRY_DB_SYNCHRONOUS", "FULL"));

pub static API_AUTH_ENABLED: Lazy<bool> = Lazy::new(|| env_flag("TELEMETRY_API_AUTH_ENABLED"));

pub static API_AUTH_TOKEN: Lazy<Option<String>> =
    Lazy::new(|| std::env::var("TELEMETRY_API_AUTH_TOKEN").ok());

pub static RATE_LIMIT_ENABLED: Lazy<bool> = Lazy::new(|| env_flag("TELEMETRY_RATE_LIMIT_ENABLED"));

pub static RATE_LIMIT_RPM: Lazy<u32> = Lazy::new(|| {
    std::env::var("TELEMETRY_RATE_LIMIT_RPM")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60)
});

/// MUST be 1 — enforced at startup by the single-writer guard (spec.md
/// §4.2, §6.3).
pub static API_WORKERS: Lazy<u32> = Lazy::new(|| {
    std::env::var("TELEMETRY_API_WORKERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
});

pub static BIND_ADDRESS: Lazy<String> = Lazy::new(|| env_or("TELEMETRY_BIND_ADDRESS", "127.0.0.1"));

pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("TELEMETRY_BIND_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000)
});

pub static EXTERNAL_MIRROR_ENABLED: Lazy<bool> =
    Lazy::new(|| env_flag("TELEMETRY_EXTERNAL_MIRROR_ENABLED"));

pub static EXTERNAL_MIRROR_URL: Lazy<Option<String>> =
    Lazy::new(|| std::env::var("TELEMETRY_EXTERNAL_MIRROR_URL").ok());

pub static EXTERNAL_MIRROR_TOKEN: Lazy<Option<String>> =
    Lazy::new(|| std::env::var("TELEMETRY_EXTERNAL_MIRROR_TOKEN").ok());

pub static RETENTION_DAYS: Lazy<i64> = Lazy::new(|| {
    std::env::var("TELEMETRY_RETENTION_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(90)
});

pub static RETENTION_BATCH_SIZE: Lazy<i64> = Lazy::new(|| {
    std::env::var("TELEMETRY_RETENTION_BATCH_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10_000)
});

pub static BACKUP_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("TELEMETRY_BACKUP_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| BASE_DIR.join("backups"))
});

pub static BACKUP_RETENTION_DAYS: Lazy<i64> = Lazy::new(|| {
    std::env::var("TELEMETRY_BACKUP_RETENTION_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(14)
});

pub static BACKUP_MIN_FREE_BYTES: Lazy<u64> = Lazy::new(|| {
    std::env::var("TELEMETRY_BACKUP_MIN_FREE_BYTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100 * 1024 * 1024)
});

/// Append-only per-UTC-day event log directory (spec.md §6.2 `raw/`).
pub static RAW_DIR: Lazy<PathBuf> = Lazy::new(|| BASE_DIR.join("raw"));

/// Client failover buffer directory (spec.md §6.2 `buffer/`).
pub static BUFFER_DIR: Lazy<PathBuf> = Lazy::new(|| BASE_DIR.join("buffer"));

/// Base URL the client pipeline posts runs to. Defaults to this same
/// service's own bind address, since in practice the client library and
/// the server it feeds run as the same deployable unit.
pub static CLIENT_API_BASE_URL: Lazy<String> = Lazy::new(|| {
    env_or(
        "TELEMETRY_CLIENT_API_BASE_URL",
        &format!("http://{}:{}", BIND_ADDRESS.as_str(), *BIND_PORT),
    )
});

/// How often the background sync worker sweeps the failover buffer.
pub static CLIENT_SYNC_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("TELEMETRY_CLIENT_SYNC_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5)
});

/// Fail fast on an unambiguously broken configuration. Mirrors the
/// teacher's `let _ = config::JWT_SECRET.as_str();` fail-fast-at-startup
/// idiom, generalized to every hard constraint spec.md §6.3 names.
pub fn validate_at_startup() -> Result<(), String> {
    if *API_WORKERS != 1 {
        return Err(format!(
            "TELEMETRY_API_WORKERS must be 1, got {}",
            *API_WORKERS
        ));
    }
    if DB_SYNCHRONOUS.to_uppercase() != "FULL" {
        return Err(format!(
            "TELEMETRY_DB_SYNCHRONOUS must be FULL, got {}",
            DB_SYNCHRONOUS.as_str()
        ));
    }
    if *API_AUTH_ENABLED && API_AUTH_TOKEN.is_none() {
        return Err("TELEMETRY_API_AUTH_TOKEN must be set when auth is enabled".to_string());
    }
    if DB_JOURNAL_MODE.to_uppercase() != "DELETE" {
        tracing::warn!(
            journal_mode = DB_JOURNAL_MODE.as_str(),
            "non-DELETE journal mode requested; this service is designed for volumes that corrupt under WAL"
        );
    }
    Ok(())
}
