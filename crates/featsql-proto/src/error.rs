//! Protocol error types.

use thiserror::Error;

/// Errors raised while building or decoding IR values.
#[derive(Debug, Error)]
pub enum Error {
    /// A filter tree is structurally invalid.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A literal could not be interpreted.
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),

    /// JSON decoding failed.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}
