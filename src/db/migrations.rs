//! Ordered, idempotent schema migrations gated by `schema_migrations.version`
//! (spec.md §3.2, §4.1). No network registry is available to an embedded
//! engine, so migrations are plain idempotent SQL run in order at
//! startup rather than files driven by a migration-runner crate — the
//! closest Rust-native analogue to the teacher's `sqlx::migrate!()` call
//! when the backing store isn't a server database.

use rusqlite::Connection;

struct Migration {
    version: i64,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create agent_runs, commits, schema_migrations",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL,
    description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agent_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    run_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    agent_name TEXT NOT NULL,
    job_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'running'
        CHECK (status IN ('running','success','failure','partial','timeout','cancelled')),
    duration_ms INTEGER CHECK (duration_ms IS NULL OR duration_ms >= 0),
    items_discovered INTEGER CHECK (items_discovered IS NULL OR items_discovered >= 0),
    items_succeeded INTEGER CHECK (items_succeeded IS NULL OR items_succeeded >= 0),
    items_failed INTEGER CHECK (items_failed IS NULL OR items_failed >= 0),
    items_skipped INTEGER CHECK (items_skipped IS NULL OR items_skipped >= 0),
    input_summary TEXT,
    output_summary TEXT,
    error_summary TEXT,
    error_details TEXT,
    source_ref TEXT,
    target_ref TEXT,
    product TEXT,
    product_family TEXT,
    platform TEXT,
    subdomain TEXT,
    website TEXT,
    website_section TEXT,
    item_name TEXT,
    git_repo TEXT,
    git_branch TEXT,
    git_commit_hash TEXT,
    git_run_tag TEXT,
    git_commit_source TEXT CHECK (git_commit_source IS NULL OR git_commit_source IN ('manual','llm','ci')),
    git_commit_author TEXT,
    git_commit_timestamp TEXT,
    host TEXT,
    environment TEXT,
    trigger_type TEXT,
    metrics_json TEXT,
    context_json TEXT,
    api_posted INTEGER NOT NULL DEFAULT 0,
    api_posted_at TEXT,
    api_retry_count INTEGER NOT NULL DEFAULT 0,
    insight_id TEXT,
    parent_run_id TEXT,
    updated_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_agent_runs_event_id ON agent_runs (event_id);
CREATE INDEX IF NOT EXISTS idx_agent_runs_agent_status_created
    ON agent_runs (agent_name, status, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_agent_runs_agent_created ON agent_runs (agent_name, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_agent_runs_created ON agent_runs (created_at DESC);
CREATE INDEX IF NOT EXISTS idx_agent_runs_job_type ON agent_runs (job_type);
CREATE INDEX IF NOT EXISTS idx_agent_runs_status ON agent_runs (status);
CREATE INDEX IF NOT EXISTS idx_agent_runs_start_time ON agent_runs (start_time DESC);
CREATE INDEX IF NOT EXISTS idx_agent_runs_insight_id ON agent_runs (insight_id) WHERE insight_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_agent_runs_commit_hash ON agent_runs (git_commit_hash) WHERE git_commit_hash IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_agent_runs_website ON agent_runs (website) WHERE website IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_agent_runs_website_section ON agent_runs (website_section) WHERE website_section IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_agent_runs_api_posted ON agent_runs (api_posted, api_posted_at);

CREATE TABLE IF NOT EXISTS commits (
    commit_hash TEXT PRIMARY KEY,
    git_repo TEXT,
    author TEXT,
    commit_timestamp TEXT,
    first_seen_at TEXT NOT NULL
);
"#,
    },
];

pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL,
            description TEXT NOT NULL
        );",
    )?;

    let applied: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= applied {
            continue;
        }
        conn.execute_batch(migration.sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                migration.version,
                chrono::Utc::now().to_rfc3339(),
                migration.description
            ],
        )?;
    }
    Ok(())
}

pub fn current_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
}
