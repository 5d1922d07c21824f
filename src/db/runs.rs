//! Run table operations: insert, batch insert, partial update, fetch,
//! query, associate-commit, distinct values, stats, retention delete
//! (spec.md §4.1).

use crate::model::{BatchError, BatchResult, InsertOutcome, NewRun, Patch, Run, RunQuery, SETTABLE_COLUMNS};
use crate::status;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

/// Insert one run. A duplicate `event_id` is not an error — it's the
/// idempotency contract (spec.md §4.1): the UNIQUE-constraint violation
/// is caught here and reported as `Duplicate` rather than propagated.
pub fn insert_run(conn: &Connection, record: &NewRun) -> rusqlite::Result<InsertOutcome> {
    let status = record
        .status
        .as_deref()
        .map(status::normalize)
        .unwrap_or_else(|| "running".to_string());

    let result = conn.execute(
        "INSERT INTO agent_runs (
            event_id, run_id, created_at, start_time, end_time, agent_name, job_type, status,
            duration_ms, items_discovered, items_succeeded, items_failed, items_skipped,
            input_summary, output_summary, error_summary, error_details,
            source_ref, target_ref, product, product_family, platform, subdomain,
            website, website_section, item_name,
            git_repo, git_branch, git_commit_hash, git_run_tag, git_commit_source,
            git_commit_author, git_commit_timestamp,
            host, environment, trigger_type, metrics_json, context_json,
            insight_id, parent_run_id
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12, ?13,
            ?14, ?15, ?16, ?17,
            ?18, ?19, ?20, ?21, ?22, ?23,
            ?24, ?25, ?26,
            ?27, ?28, ?29, ?30, ?31,
            ?32, ?33,
            ?34, ?35, ?36, ?37, ?38,
            ?39, ?40
        )",
        params![
            record.event_id,
            record.run_id,
            chrono::Utc::now().to_rfc3339(),
            record.start_time.to_rfc3339(),
            record.end_time.map(|t| t.to_rfc3339()),
            record.agent_name,
            record.job_type,
            status,
            record.duration_ms,
            record.items_discovered,
            record.items_succeeded,
            record.items_failed,
            record.items_skipped,
            record.input_summary,
            record.output_summary,
            record.error_summary,
            record.error_details,
            record.source_ref,
            record.target_ref,
            record.product,
            record.product_family,
            record.platform,
            record.subdomain,
            record.website,
            record.website_section,
            record.item_name,
            record.git_repo,
            record.git_branch,
            record.git_commit_hash,
            record.git_run_tag,
            record.git_commit_source,
            record.git_commit_author,
            record.git_commit_timestamp,
            record.host,
            record.environment,
            record.trigger_type,
            record.metrics_json.as_ref().map(|v| v.to_string()),
            record.context_json.as_ref().map(|v| v.to_string()),
            record.insight_id,
            record.parent_run_id,
        ],
    );

    match result {
        Ok(_) => Ok(InsertOutcome::Created),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(InsertOutcome::Duplicate)
        }
        Err(other) => Err(other),
    }
}

/// Each record is attempted independently inside a single transaction;
/// duplicates increment a counter, unrelated errors are collected
/// per-record, and the whole batch commits together (spec.md §4.1).
/// Partial failure never surfaces as a top-level error — the caller
/// inspects the returned counts.
pub fn batch_insert(conn: &mut Connection, records: &[NewRun]) -> rusqlite::Result<BatchResult> {
    let total = records.len();
    let mut inserted = 0usize;
    let mut duplicates = 0usize;
    let mut errors = Vec::new();

    let tx = conn.transaction()?;
    for record in records {
        match insert_run(&tx, record) {
            Ok(InsertOutcome::Created) => inserted += 1,
            Ok(InsertOutcome::Duplicate) => duplicates += 1,
            Err(e) => errors.push(BatchError {
                event_id: record.event_id.clone(),
                detail: e.to_string(),
            }),
        }
    }
    tx.commit()?;

    Ok(BatchResult {
        inserted,
        duplicates,
        errors,
        total,
    })
}

/// Partial update: only fields explicitly present in `patch` are written.
/// JSON `null` sets the column to `NULL`; absence leaves it unchanged.
/// Returns the list of column names actually written, or `None` if no
/// row matched `event_id`.
pub fn update_fields(
    conn: &Connection,
    event_id: &str,
    patch: &Patch,
) -> rusqlite::Result<Option<Vec<String>>> {
    let mut set_clauses = Vec::new();
    let mut bind_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    let mut fields_updated = Vec::new();

    for (key, value) in patch {
        if !SETTABLE_COLUMNS.contains(&key.as_str()) {
            continue;
        }
        set_clauses.push(format!("{key} = ?"));
        bind_values.push(json_value_to_sql(key, value));
        fields_updated.push(key.clone());
    }

    if set_clauses.is_empty() {
        // Caller (the handler) is responsible for turning this into a
        // 400; the storage layer just reports "nothing to do".
        return Ok(if row_exists(conn, event_id)? {
            Some(Vec::new())
        } else {
            None
        });
    }

    set_clauses.push("updated_at = ?".to_string());
    bind_values.push(Box::new(chrono::Utc::now().to_rfc3339()));

    let sql = format!(
        "UPDATE agent_runs SET {} WHERE event_id = ?",
        set_clauses.join(", ")
    );
    bind_values.push(Box::new(event_id.to_string()));

    let params: Vec<&dyn rusqlite::ToSql> = bind_values.iter().map(|b| b.as_ref()).collect();
    let affected = conn.execute(&sql, params.as_slice())?;

    if affected == 0 {
        Ok(None)
    } else {
        Ok(Some(fields_updated))
    }
}

fn row_exists(conn: &Connection, event_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM agent_runs WHERE event_id = ?1",
        params![event_id],
        |_| Ok(()),
    )
    .optional()
    .map(|r| r.is_some())
}

fn json_value_to_sql(column: &str, value: &Value) -> Box<dyn rusqlite::ToSql> {
    if value.is_null() {
        return Box::new(None::<String>);
    }
    match column {
        "status" => Box::new(status::normalize(value.as_str().unwrap_or_default())),
        "metrics_json" | "context_json" => Box::new(value.to_string()),
        "api_posted" => Box::new(value.as_bool().unwrap_or(false)),
        "duration_ms" | "items_discovered" | "items_succeeded" | "items_failed"
        | "items_skipped" | "api_retry_count" => Box::new(value.as_i64()),
        _ => Box::new(value.as_str().map(|s| s.to_string()).unwrap_or_else(|| value.to_string())),
    }
}

pub fn fetch_by_event_id(conn: &Connection, event_id: &str) -> rusqlite::Result<Option<Run>> {
    conn.query_row(
        "SELECT * FROM agent_runs WHERE event_id = ?1",
        params![event_id],
        row_to_run,
    )
    .optional()
}

/// Dynamic-predicate query (spec.md §4.5.3): start from `1=1`, append an
/// `AND col = ?` only for each non-null filter, then
/// `ORDER BY created_at DESC LIMIT ? OFFSET ?`.
pub fn query(conn: &Connection, filter: &RunQuery) -> rusqlite::Result<Vec<Run>> {
    let mut sql = String::from("SELECT * FROM agent_runs WHERE 1=1");
    let mut binds: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(agent_name) = &filter.agent_name {
        sql.push_str(" AND agent_name = ?");
        binds.push(Box::new(agent_name.clone()));
    }
    if let Some(status) = &filter.status {
        sql.push_str(" AND status = ?");
        binds.push(Box::new(status::normalize(status)));
    }
    if let Some(job_type) = &filter.job_type {
        sql.push_str(" AND job_type = ?");
        binds.push(Box::new(job_type.clone()));
    }
    if let Some(after) = filter.created_after {
        sql.push_str(" AND created_at >= ?");
        binds.push(Box::new(after.to_rfc3339()));
    }
    if let Some(before) = filter.created_before {
        sql.push_str(" AND created_at < ?");
        binds.push(Box::new(before.to_rfc3339()));
    }
    if let Some(after) = filter.start_after {
        sql.push_str(" AND start_time >= ?");
        binds.push(Box::new(after.to_rfc3339()));
    }
    if let Some(before) = filter.start_before {
        sql.push_str(" AND start_time < ?");
        binds.push(Box::new(before.to_rfc3339()));
    }

    sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
    binds.push(Box::new(filter.limit));
    binds.push(Box::new(filter.offset));

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = binds.iter().map(|b| b.as_ref()).collect();
    let rows = stmt.query_map(params.as_slice(), row_to_run)?;
    rows.collect()
}

/// Overwrites `git_commit_*` fields on an existing run and upserts the
/// deduped `commits` cache (spec.md §3.2, §4.5.1 associate-commit).
pub fn associate_commit(
    conn: &mut Connection,
    event_id: &str,
    hash: &str,
    source: &str,
    author: Option<&str>,
    commit_timestamp: Option<&str>,
    git_repo: Option<&str>,
) -> rusqlite::Result<bool> {
    let tx = conn.transaction()?;
    let affected = tx.execute(
        "UPDATE agent_runs SET git_commit_hash = ?1, git_commit_source = ?2,
            git_commit_author = ?3, git_commit_timestamp = ?4, updated_at = ?5
         WHERE event_id = ?6",
        params![
            hash,
            source,
            author,
            commit_timestamp,
            chrono::Utc::now().to_rfc3339(),
            event_id
        ],
    )?;

    if affected > 0 {
        tx.execute(
            "INSERT INTO commits (commit_hash, git_repo, author, commit_timestamp, first_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(commit_hash) DO UPDATE SET
                git_repo = excluded.git_repo,
                author = excluded.author,
                commit_timestamp = excluded.commit_timestamp",
            params![
                hash,
                git_repo,
                author,
                commit_timestamp,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
    }
    tx.commit()?;
    Ok(affected > 0)
}

/// Distinct, alphabetically ordered, NULL-excluded values of `column`
/// (spec.md §4.5.1 `/api/v1/metadata`). `column` must be one of a fixed
/// allow-list — never interpolate caller input into the column position
/// otherwise.
pub fn distinct_values(conn: &Connection, column: &str) -> rusqlite::Result<Vec<String>> {
    if !matches!(column, "agent_name" | "job_type") {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT DISTINCT {column} FROM agent_runs WHERE {column} IS NOT NULL ORDER BY {column} ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

pub struct Stats {
    pub total_runs: i64,
    pub agent_counts: Vec<(String, i64)>,
    pub recent_24h: i64,
}

pub fn stats(conn: &Connection) -> rusqlite::Result<Stats> {
    let total_runs: i64 = conn.query_row("SELECT COUNT(*) FROM agent_runs", [], |row| row.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT agent_name, COUNT(*) AS c FROM agent_runs GROUP BY agent_name ORDER BY c DESC",
    )?;
    let agent_counts = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let cutoff = (chrono::Utc::now() - chrono::Duration::hours(24)).to_rfc3339();
    let recent_24h: i64 = conn.query_row(
        "SELECT COUNT(*) FROM agent_runs WHERE created_at >= ?1",
        params![cutoff],
        |row| row.get(0),
    )?;

    Ok(Stats {
        total_runs,
        agent_counts,
        recent_24h,
    })
}

pub struct RetentionStats {
    pub row_count: i64,
    pub min_created_at: Option<String>,
    pub max_created_at: Option<String>,
}

pub fn retention_stats(conn: &Connection) -> rusqlite::Result<RetentionStats> {
    conn.query_row(
        "SELECT COUNT(*), MIN(created_at), MAX(created_at) FROM agent_runs",
        [],
        |row| {
            Ok(RetentionStats {
                row_count: row.get(0)?,
                min_created_at: row.get(1)?,
                max_created_at: row.get(2)?,
            })
        },
    )
}

/// Delete rows older than `cutoff` in bounded batches of `batch_size`,
/// committing between batches (spec.md §4.7). Returns the total number
/// of rows deleted.
pub fn delete_older_than(
    conn: &mut Connection,
    cutoff: chrono::DateTime<chrono::Utc>,
    batch_size: i64,
    dry_run: bool,
) -> rusqlite::Result<i64> {
    let cutoff_str = cutoff.to_rfc3339();

    if dry_run {
        return conn.query_row(
            "SELECT COUNT(*) FROM agent_runs WHERE created_at < ?1",
            params![cutoff_str],
            |row| row.get(0),
        );
    }

    let mut total_deleted = 0i64;
    loop {
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM agent_runs WHERE id IN (
                SELECT id FROM agent_runs WHERE created_at < ?1 LIMIT ?2
            )",
            params![cutoff_str, batch_size],
        )?;
        tx.commit()?;
        total_deleted += deleted as i64;
        if (deleted as i64) < batch_size {
            break;
        }
    }
    Ok(total_deleted)
}

fn row_to_run(row: &Row) -> rusqlite::Result<Run> {
    let created_at: String = row.get("created_at")?;
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let api_posted_at: Option<String> = row.get("api_posted_at")?;
    let updated_at: Option<String> = row.get("updated_at")?;
    let metrics_raw: Option<String> = row.get("metrics_json")?;
    let context_raw: Option<String> = row.get("context_json")?;

    let (metrics_json, metrics_json_parse_error) = parse_json_column(metrics_raw);
    let (context_json, context_json_parse_error) = parse_json_column(context_raw);

    Ok(Run {
        event_id: row.get("event_id")?,
        run_id: row.get("run_id")?,
        created_at: parse_rfc3339(&created_at),
        start_time: parse_rfc3339(&start_time),
        end_time: end_time.as_deref().map(parse_rfc3339),
        agent_name: row.get("agent_name")?,
        job_type: row.get("job_type")?,
        status: row.get("status")?,
        duration_ms: row.get("duration_ms")?,
        items_discovered: row.get("items_discovered")?,
        items_succeeded: row.get("items_succeeded")?,
        items_failed: row.get("items_failed")?,
        items_skipped: row.get("items_skipped")?,
        input_summary: row.get("input_summary")?,
        output_summary: row.get("output_summary")?,
        error_summary: row.get("error_summary")?,
        error_details: row.get("error_details")?,
        source_ref: row.get("source_ref")?,
        target_ref: row.get("target_ref")?,
        product: row.get("product")?,
        product_family: row.get("product_family")?,
        platform: row.get("platform")?,
        subdomain: row.get("subdomain")?,
        website: row.get("website")?,
        website_section: row.get("website_section")?,
        item_name: row.get("item_name")?,
        git_repo: row.get("git_repo")?,
        git_branch: row.get("git_branch")?,
        git_commit_hash: row.get("git_commit_hash")?,
        git_run_tag: row.get("git_run_tag")?,
        git_commit_source: row.get("git_commit_source")?,
        git_commit_author: row.get("git_commit_author")?,
        git_commit_timestamp: row.get("git_commit_timestamp")?,
        host: row.get("host")?,
        environment: row.get("environment")?,
        trigger_type: row.get("trigger_type")?,
        metrics_json,
        metrics_json_parse_error,
        context_json,
        context_json_parse_error,
        api_posted: row.get::<_, i64>("api_posted")? != 0,
        api_posted_at: api_posted_at.as_deref().map(parse_rfc3339),
        api_retry_count: row.get("api_retry_count")?,
        insight_id: row.get("insight_id")?,
        parent_run_id: row.get("parent_run_id")?,
        updated_at: updated_at.as_deref().map(parse_rfc3339),
        commit_url: None,
        repo_url: None,
    })
}

fn parse_rfc3339(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

/// Parse a JSON text column back into a `Value`. A parse error attaches
/// a sibling `{col}_parse_error` marker and preserves the raw string
/// rather than losing the data (spec.md §4.5.3, §9).
fn parse_json_column(raw: Option<String>) -> (Option<Value>, Option<String>) {
    match raw {
        None => (None, None),
        Some(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) => (Some(value), None),
            Err(e) => (Some(Value::String(text)), Some(e.to_string())),
        },
    }
}
