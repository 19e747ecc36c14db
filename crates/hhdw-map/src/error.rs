//! Error types for mapping operations.

use thiserror::Error;

/// Errors raised while building locators or resolvers.
#[derive(Debug, Error)]
pub enum MapError {
    /// A role pattern is not a valid regular expression.
    #[error("invalid pattern {pattern:?} for role '{role}': {source}")]
    InvalidPattern {
        role: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A role override names a group that does not exist.
    #[error("unknown role group: {0}")]
    UnknownGroup(String),

    /// Fuzzy threshold outside the 0-100 score range.
    #[error("fuzzy threshold {0} is outside 0..=100")]
    InvalidThreshold(f64),

    /// Partial matching needs at least one leading token.
    #[error("partial token count must be at least 1")]
    InvalidPartialTokens,
}

/// A role could not be located among a source's columns.
///
/// Callers treat the role as absent; this never aborts a stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("role '{role}' not located in source columns")]
    RoleAbsent { role: String },
}

pub type Result<T> = std::result::Result<T, MapError>;
