//! Query pattern parsing and glob matching for repository discovery.
//!
//! A query is a `/`-delimited glob of up to three segments, `org/project/repo`.
//! Missing trailing segments are padded with `*`, so `pdidev` means every
//! project and repository in organizations matching `pdidev`.
//!
//! Matching is glob-based (`*` = any run, `?` = one character). A pattern with no
//! wildcard at all also matches any text it is a prefix of: `pdidev` matches
//! `pdidev.visualstudio.com`. Patterns containing `?` but no `*` do not get the
//! prefix fallback.

use regex::RegexBuilder;
use serde::Serialize;

use crate::error::{FleetError, Result};

pub const WILDCARD: &str = "*";
const MAX_SEGMENTS: usize = 3;

/// A parsed `org/project/repo` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryPattern {
    pub org_pattern: String,
    pub project_pattern: String,
    pub repo_pattern: String,
}

impl QueryPattern {
    /// Validate and parse a raw query string.
    pub fn parse(query: &str) -> Result<Self> {
        validate(query)?;

        let mut segments = query
            .trim()
            .split('/')
            .map(|s| if s.is_empty() { WILDCARD } else { s })
            .map(str::to_string);

        let org_pattern = segments.next().unwrap_or_else(|| WILDCARD.to_string());
        let project_pattern = segments.next().unwrap_or_else(|| WILDCARD.to_string());
        let repo_pattern = segments.next().unwrap_or_else(|| WILDCARD.to_string());

        Ok(QueryPattern {
            org_pattern,
            project_pattern,
            repo_pattern,
        })
    }

    /// Pattern that accepts everything, equivalent to `*/*/*`.
    pub fn any() -> Self {
        QueryPattern {
            org_pattern: WILDCARD.to_string(),
            project_pattern: WILDCARD.to_string(),
            repo_pattern: WILDCARD.to_string(),
        }
    }

    pub fn has_org_filter(&self) -> bool {
        self.org_pattern != WILDCARD
    }

    pub fn has_project_filter(&self) -> bool {
        self.project_pattern != WILDCARD
    }

    pub fn has_repo_filter(&self) -> bool {
        self.repo_pattern != WILDCARD
    }

    pub fn matches_org(&self, name: &str) -> bool {
        !self.has_org_filter() || matches(name, &self.org_pattern, false)
    }

    pub fn matches_project(&self, name: &str) -> bool {
        !self.has_project_filter() || matches(name, &self.project_pattern, false)
    }

    pub fn matches_repo(&self, name: &str) -> bool {
        !self.has_repo_filter() || matches(name, &self.repo_pattern, false)
    }
}

impl std::fmt::Display for QueryPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.org_pattern, self.project_pattern, self.repo_pattern
        )
    }
}

/// Reject empty input, more than three segments, and characters outside
/// `[A-Za-z0-9*?/_.-]`.
pub fn validate(query: &str) -> Result<()> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(FleetError::Validation("query must not be empty".to_string()));
    }

    let segments = trimmed.split('/').count();
    if segments > MAX_SEGMENTS {
        return Err(FleetError::Validation(format!(
            "query '{trimmed}' has {segments} segments, expected at most {MAX_SEGMENTS} (org/project/repo)"
        )));
    }

    if let Some(bad) = trimmed
        .chars()
        .find(|&c| !(c.is_ascii_alphanumeric() || matches!(c, '*' | '?' | '/' | '_' | '.' | '-')))
    {
        return Err(FleetError::Validation(format!(
            "query '{trimmed}' contains invalid character '{bad}'"
        )));
    }

    Ok(())
}

/// Glob-match `text` against `pattern`, with the bare-prefix fallback for
/// wildcard-free patterns.
pub fn matches(text: &str, pattern: &str, case_sensitive: bool) -> bool {
    if glob_matches(text, pattern, case_sensitive) {
        return true;
    }

    if pattern.contains('*') || pattern.contains('?') {
        return false;
    }

    if case_sensitive {
        text.starts_with(pattern)
    } else {
        text.to_lowercase().starts_with(&pattern.to_lowercase())
    }
}

fn glob_matches(text: &str, pattern: &str, case_sensitive: bool) -> bool {
    let mut expr = String::with_capacity(pattern.len() * 2 + 2);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');

    match RegexBuilder::new(&expr)
        .case_insensitive(!case_sensitive)
        .build()
    {
        Ok(re) => re.is_match(text),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Failed to compile glob pattern");
            false
        }
    }
}
