//! Request-boundary validation for the ingestion API (spec.md §4.5.2).
//! Schema validation happens here, before anything reaches storage:
//! required fields, status normalization before the `CHECK` constraint,
//! non-negative counters, a closed `git_commit_source` set, commit-hash
//! length, and `run_id` shape. Failures collect into field-level detail
//! for a 422 response rather than failing fast on the first problem.

use crate::model::NewRun;
use crate::status;
use serde_json::{json, Value};

pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

pub fn validate_new_run(record: &NewRun) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if record.agent_name.trim().is_empty() {
        errors.push(FieldError {
            field: "agent_name",
            message: "must not be empty".to_string(),
        });
    }
    if record.job_type.trim().is_empty() {
        errors.push(FieldError {
            field: "job_type",
            message: "must not be empty".to_string(),
        });
    }

    if let Err(reason) = validate_run_id(&record.run_id) {
        errors.push(FieldError {
            field: "run_id",
            message: reason,
        });
    }

    if let Some(status_raw) = &record.status {
        let normalized = status::normalize(status_raw);
        if !status::is_canonical(&normalized) {
            errors.push(FieldError {
                field: "status",
                message: format!("unknown status `{status_raw}`"),
            });
        }
    }

    for (field, value) in [
        ("duration_ms", record.duration_ms),
        ("items_discovered", record.items_discovered),
        ("items_succeeded", record.items_succeeded),
        ("items_failed", record.items_failed),
        ("items_skipped", record.items_skipped),
    ] {
        if let Some(v) = value {
            if v < 0 {
                errors.push(FieldError {
                    field,
                    message: "must be >= 0".to_string(),
                });
            }
        }
    }

    if let Some(source) = &record.git_commit_source {
        if !matches!(source.as_str(), "manual" | "llm" | "ci") {
            errors.push(FieldError {
                field: "git_commit_source",
                message: "must be one of manual, llm, ci".to_string(),
            });
        }
    }

    if let Some(hash) = &record.git_commit_hash {
        if !(7..=40).contains(&hash.len()) {
            errors.push(FieldError {
                field: "git_commit_hash",
                message: "must be 7-40 characters".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `run_id` length <=255, no `/`, `\`, or NUL, non-empty.
pub fn validate_run_id(run_id: &str) -> Result<(), String> {
    if run_id.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    if run_id.len() > 255 {
        return Err("must be at most 255 characters".to_string());
    }
    if run_id.contains('/') || run_id.contains('\\') || run_id.contains('\0') {
        return Err("must not contain '/', '\\\\', or NUL".to_string());
    }
    Ok(())
}

pub fn validate_commit_hash(hash: &str) -> Result<(), String> {
    if !(7..=40).contains(&hash.len()) {
        return Err("must be 7-40 characters".to_string());
    }
    Ok(())
}

pub fn errors_to_json(errors: Vec<FieldError>) -> Value {
    json!(errors
        .into_iter()
        .map(|e| json!({ "field": e.field, "message": e.message }))
        .collect::<Vec<_>>())
}
