//! Git repo/commit URL normalization (spec.md §4.4). Pure functions, no I/O.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Github,
    Gitlab,
    Bitbucket,
}

/// Normalize an SSH or HTTPS repo URL to a canonical `https://` form with
/// no trailing `.git` or `/`. Returns `None` for anything that doesn't
/// resolve to an `https://` URL (graceful degradation for self-hosted or
/// unparseable schemes).
pub fn normalize_repo(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut normalized = if let Some(rest) = trimmed.strip_prefix("git@") {
        // git@HOST:PATH -> https://HOST/PATH
        let (host, path) = rest.split_once(':')?;
        format!("https://{host}/{path}")
    } else {
        trimmed.to_string()
    };

    // `.git` and a trailing `/` can alternate (`...r.git/`), so strip
    // both to a fixed point rather than once each.
    loop {
        if normalized.ends_with('/') {
            normalized.pop();
        } else if let Some(stripped) = normalized.strip_suffix(".git") {
            normalized = stripped.to_string();
        } else {
            break;
        }
    }

    if normalized.starts_with("https://") {
        Some(normalized)
    } else {
        None
    }
}

/// Detect the hosting platform from a normalized repo URL by case-insensitive
/// host match. Self-hosted hosts that don't match a known platform return
/// `None`.
pub fn detect_platform(url: &str) -> Option<Platform> {
    let normalized = normalize_repo(url)?;
    let host = normalized
        .strip_prefix("https://")?
        .split('/')
        .next()?
        .to_lowercase();

    if host == "github.com" || host.ends_with(".github.com") {
        Some(Platform::Github)
    } else if host == "gitlab.com" || host.ends_with(".gitlab.com") {
        Some(Platform::Gitlab)
    } else if host == "bitbucket.org" || host.ends_with(".bitbucket.org") {
        Some(Platform::Bitbucket)
    } else {
        None
    }
}

/// Build a commit-browse URL for `repo` + `hash`. Returns `None` if the
/// repo URL doesn't normalize or the platform isn't recognized.
pub fn build_commit_url(repo: &str, hash: &str) -> Option<String> {
    let normalized = normalize_repo(repo)?;
    let platform = detect_platform(repo)?;
    let path = match platform {
        Platform::Github => format!("{normalized}/commit/{hash}"),
        Platform::Gitlab => format!("{normalized}/-/commit/{hash}"),
        Platform::Bitbucket => format!("{normalized}/commits/{hash}"),
    };
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_ssh_github_url() {
        assert_eq!(
            normalize_repo("git@github.com:o/r.git"),
            Some("https://github.com/o/r".to_string())
        );
    }

    #[test]
    fn strips_trailing_slash_and_git_suffix() {
        assert_eq!(
            normalize_repo("https://gitlab.com/o/r.git/"),
            Some("https://gitlab.com/o/r".to_string())
        );
    }

    #[test]
    fn non_https_resolution_returns_none() {
        assert_eq!(normalize_repo("ftp://x"), None);
    }

    #[test]
    fn self_hosted_platform_is_none() {
        assert_eq!(detect_platform("https://git.example.com/o/r"), None);
    }

    #[test]
    fn commit_url_per_platform() {
        assert_eq!(
            build_commit_url("git@github.com:o/r.git", "abc1234"),
            Some("https://github.com/o/r/commit/abc1234".to_string())
        );
        assert_eq!(
            build_commit_url("https://gitlab.com/o/r", "abc1234"),
            Some("https://gitlab.com/o/r/-/commit/abc1234".to_string())
        );
        assert_eq!(
            build_commit_url("https://bitbucket.org/o/r", "abc1234"),
            Some("https://bitbucket.org/o/r/commits/abc1234".to_string())
        );
    }

    #[test]
    fn unsupported_platform_returns_none() {
        assert_eq!(build_commit_url("ftp://x", "abc1234"), None);
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_repo("git@github.com:o/r.git").unwrap();
        let twice = normalize_repo(&once).unwrap();
        assert_eq!(once, twice);
    }
}
