//! SQL-pattern rejection.
//!
//! A deny-list heuristic layered on top of parameterized queries in the data
//! layer. Patterns are evaluated in order and the first match wins. False
//! positives on prose containing keywords are accepted.

use regex::Regex;
use serde_json::Value;

use crate::config::SanitizerConfig;

/// A rejection pattern failed to compile.
#[derive(Debug, thiserror::Error)]
#[error("invalid rejection pattern {pattern:?}: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Ordered set of compiled rejection patterns.
#[derive(Debug, Clone)]
pub struct RejectionPatterns {
    patterns: Vec<Regex>,
}

impl Default for RejectionPatterns {
    fn default() -> Self {
        Self::from_config(&SanitizerConfig::default()).expect("default patterns compile")
    }
}

impl RejectionPatterns {
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| PatternError {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn from_config(config: &SanitizerConfig) -> Result<Self, PatternError> {
        Self::new(&config.rejection_patterns)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Index of the first pattern matching `input`.
    pub fn first_match(&self, input: &str) -> Option<usize> {
        self.patterns.iter().position(|p| p.is_match(input))
    }

    pub fn matches_str(&self, input: &str) -> bool {
        self.first_match(input).is_some()
    }

    /// True if any string leaf or object key anywhere in `value` matches.
    pub fn matches_value(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => self.matches_str(s),
            Value::Array(items) => items.iter().any(|v| self.matches_value(v)),
            Value::Object(map) => map
                .iter()
                .any(|(k, v)| self.matches_str(k) || self.matches_value(v)),
            _ => false,
        }
    }
}
