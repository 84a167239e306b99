//! Subtest Name Filter
//!
//! `--run-subtest` takes a comma-separated list of glob patterns. A pattern
//! prefixed with `!` excludes matching names.

use glob::{Pattern, PatternError};
use std::fmt;

/// Compiled `--run-subtest` argument
#[derive(Debug, Clone)]
pub struct SubtestFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    source: String,
}

impl SubtestFilter {
    /// Compile a filter such as `"basic-*,!basic-slow"`.
    pub fn parse(patterns: &str) -> Result<Self, PatternError> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for raw in patterns.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match raw.strip_prefix('!') {
                Some(negated) => exclude.push(Pattern::new(negated)?),
                None => include.push(Pattern::new(raw)?),
            }
        }
        Ok(Self {
            include,
            exclude,
            source: patterns.to_string(),
        })
    }

    /// Whether subtest `name` is selected
    pub fn matches(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(name));
        included && !self.exclude.iter().any(|p| p.matches(name))
    }

    /// The filter as given on the command line
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for SubtestFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
