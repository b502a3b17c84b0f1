//! Public-path classification.
//!
//! Patterns are globs with a single metacharacter: `*` matches any run of characters
//! (including `/` and the empty run). Everything else is literal, so a pattern such as
//! `/v1.0/(x)` matches only that exact path. Each pattern is anchored at both ends of
//! the request path.

use regex::RegexSet;

use crate::core::error::{GatewayError, GatewayResult};

/// Compile one glob pattern into an anchored regular expression source
pub fn glob_to_regex(pattern: &str) -> String {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    format!("^{}$", body)
}

/// Immutable set of public-path rules
#[derive(Debug, Clone)]
pub struct PathMatcher {
    patterns: Vec<String>,
    set: RegexSet,
}

impl PathMatcher {
    pub fn new<I, S>(patterns: I) -> GatewayResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let set = RegexSet::new(patterns.iter().map(|p| glob_to_regex(p)))
            .map_err(|e| GatewayError::config(format!("Invalid public path pattern: {}", e)))?;

        Ok(Self { patterns, set })
    }

    /// Whether `path` matches any configured pattern
    pub fn is_match(&self, path: &str) -> bool {
        self.set.is_match(path)
    }

    /// The first pattern that matches `path`, for logging
    pub fn matching_pattern(&self, path: &str) -> Option<&str> {
        self.set
            .matches(path)
            .iter()
            .next()
            .map(|index| self.patterns[index].as_str())
    }
}
