//! Core error types.

use std::fmt;
use thiserror::Error;

/// Classification of a failure reported by the SQL row source/sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    /// A constraint (unique, foreign key, not null, check) was violated.
    Constraint,
    /// The statement or a value could not be parsed by the database.
    Parse,
    /// The connection failed or was closed.
    Connection,
    /// Anything else.
    Other,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionErrorKind::Constraint => write!(f, "constraint"),
            ExecutionErrorKind::Parse => write!(f, "parse"),
            ExecutionErrorKind::Connection => write!(f, "connection"),
            ExecutionErrorKind::Other => write!(f, "other"),
        }
    }
}

/// A failure reported by the SQL row source/sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl ExecutionError {
    /// Create an execution error.
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the caller caused this failure (bad data rather than a broken store).
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self.kind,
            ExecutionErrorKind::Constraint | ExecutionErrorKind::Parse
        )
    }
}

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A source path or filtered property cannot be mapped.
    #[error("mapping error for '{path}': {reason}")]
    Mapping { path: String, reason: String },

    /// A value container operation addressed a path that was never registered.
    #[error("no values found for path {0}")]
    UnregisteredPath(String),

    /// Streamed or staged rows do not match the recorded row structure.
    #[error("no values found for row {row} of {path}")]
    RowReconstruction { path: String, row: usize },

    /// The row source/sink failed.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// A direct identifier lookup found nothing.
    #[error("feature not found: {0}")]
    NotFound(String),

    /// A write was rejected because of the submitted data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A write failed for reasons unrelated to the submitted data.
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] featsql_proto::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a mapping error naming the offending path or property.
    pub fn mapping(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Mapping {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_error_names_path() {
        let err = Error::mapping("parcel/[a=b]x/c", "ambiguous join");
        assert_eq!(
            err.to_string(),
            "mapping error for 'parcel/[a=b]x/c': ambiguous join"
        );
    }

    #[test]
    fn test_row_reconstruction_message() {
        let err = Error::RowReconstruction {
            path: "parcel/[id=parcel_id]address".into(),
            row: 3,
        };
        assert_eq!(
            err.to_string(),
            "no values found for row 3 of parcel/[id=parcel_id]address"
        );
    }

    #[test]
    fn test_execution_error_classification() {
        assert!(ExecutionError::new(ExecutionErrorKind::Constraint, "dup").is_user_facing());
        assert!(ExecutionError::new(ExecutionErrorKind::Parse, "bad").is_user_facing());
        assert!(!ExecutionError::new(ExecutionErrorKind::Connection, "eof").is_user_facing());
    }
}
