//! Configuration errors
//!
//! All mode and label strings are parsed fail-fast before any index is
//! built or any retrieval runs. Unknown strings are errors, never a
//! warning with a silent default.

use thiserror::Error;

/// Errors raised while turning configuration into components.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Set-fusion mode must be "and" or "or".
    #[error("invalid fusion mode '{0}', expected 'and' or 'or'")]
    InvalidFusionMode(String),

    /// Retriever-type label is not one of the supported set.
    #[error("unsupported retriever type '{0}'")]
    UnsupportedRetriever(String),

    /// A sub-mode string (summary mode, tree mode, fusion strategy,
    /// response mode) did not parse.
    #[error("invalid {field} '{value}', expected one of: {expected}")]
    InvalidMode {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    /// A numeric option is outside its valid range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}
