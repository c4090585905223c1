//! Path pattern matching.
//!
//! # Pattern Forms
//! - `/health`: exact match
//! - `/api/*`: the prefix `/api` itself, or anything under `/api/`
//! - `/files/*.json`: glob, `*` matches any run of characters (including `/`)
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Trailing `/*` is a segment-aware prefix: `/api/*` never matches `/apiz`
//! - Globs compile once to an anchored regex; literal parts are escaped

use regex::Regex;

/// A compiled route path pattern.
#[derive(Debug, Clone)]
pub enum PathPattern {
    Exact(String),
    Prefix { pattern: String, prefix: String },
    Glob { pattern: String, regex: Regex },
}

impl PathPattern {
    /// Compile a pattern string.
    pub fn parse(pattern: &str) -> Result<Self, regex::Error> {
        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Ok(PathPattern::Prefix {
                pattern: pattern.to_string(),
                prefix: prefix.to_string(),
            });
        }

        if pattern.contains('*') {
            let body = pattern
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            let regex = Regex::new(&format!("^{body}$"))?;
            return Ok(PathPattern::Glob {
                pattern: pattern.to_string(),
                regex,
            });
        }

        Ok(PathPattern::Exact(pattern.to_string()))
    }

    /// Returns true if `path` matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(exact) => exact == path,
            PathPattern::Prefix { prefix, .. } => {
                path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            PathPattern::Glob { regex, .. } => regex.is_match(path),
        }
    }

    /// The pattern as written in configuration.
    pub fn as_str(&self) -> &str {
        match self {
            PathPattern::Exact(pattern) => pattern,
            PathPattern::Prefix { pattern, .. } | PathPattern::Glob { pattern, .. } => pattern,
        }
    }

    /// Prefix before a trailing `/*`, if this is a wildcard-suffix pattern.
    pub fn wildcard_prefix(&self) -> Option<&str> {
        match self {
            PathPattern::Prefix { prefix, .. } => Some(prefix),
            _ => None,
        }
    }
}
