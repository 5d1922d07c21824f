//! Status alias normalization (spec.md §4.3).
//!
//! A pure, total function: known aliases fold onto the canonical set,
//! canonical values pass through unchanged, and anything else passes
//! through unchanged too — an unknown status simply won't satisfy the
//! `CHECK` constraint on write, and matches no rows as a query filter.

/// Map a client-supplied status string onto the canonical six-value set.
/// Never store the alias form; this must run on every write path and on
/// the query `status=` filter before either touches storage.
pub fn normalize(input: &str) -> String {
    match input {
        "failed" => "failure".to_string(),
        "completed" | "succeeded" => "success".to_string(),
        other => other.to_string(),
    }
}

pub fn is_canonical(s: &str) -> bool {
    matches!(
        s,
        "running" | "success" | "failure" | "partial" | "timeout" | "cancelled"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_known_aliases() {
        assert_eq!(normalize("failed"), "failure");
        assert_eq!(normalize("completed"), "success");
        assert_eq!(normalize("succeeded"), "success");
    }

    #[test]
    fn canonical_values_pass_through() {
        for s in ["running", "success", "failure", "partial", "timeout", "cancelled"] {
            assert_eq!(normalize(s), s);
        }
    }

    #[test]
    fn unknown_values_pass_through_unchanged() {
        assert_eq!(normalize("bogus"), "bogus");
    }

    #[test]
    fn idempotent() {
        for s in ["failed", "completed", "succeeded", "running", "bogus"] {
            let once = normalize(s);
            let twice = normalize(&once);
            assert_eq!(once, twice);
        }
    }
}
