//! Core error types.

use thiserror::Error;

/// Errors raised while converting core vocabulary types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A string did not name a member of a closed enumeration.
    #[error("unknown {kind}: {value}")]
    UnknownName {
        /// Which enumeration was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A value could not be converted to or from its map representation.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A map representation did not hold a JSON object.
    #[error("expected a map, found {0}")]
    NotAMap(String),
}

/// Result type for core conversions.
pub type CoreResult<T> = Result<T, CoreError>;
