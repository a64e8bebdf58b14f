//! Write-side IR: the value operations an external decoder performs while
//! staging a feature, and the kinds of mutation a caller can request.

use serde::{Deserialize, Serialize};

/// One staging operation against a value container.
///
/// `path` is a table path or a column path; values resolve to the deepest
/// registered table path that prefixes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ValueOp {
    /// Open a new row for a nested table under the current parent row.
    Row { path: String },
    /// Set a column value on the current row of the resolved table.
    Value {
        path: String,
        column: String,
        value: String,
    },
    /// Set a column to SQL NULL.
    Null { path: String, column: String },
}

impl ValueOp {
    /// Create a row operation.
    pub fn row(path: impl Into<String>) -> Self {
        ValueOp::Row { path: path.into() }
    }

    /// Create a value operation.
    pub fn value(
        path: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        ValueOp::Value {
            path: path.into(),
            column: column.into(),
            value: value.into(),
        }
    }

    /// Create a null operation.
    pub fn null(path: impl Into<String>, column: impl Into<String>) -> Self {
        ValueOp::Null {
            path: path.into(),
            column: column.into(),
        }
    }
}

/// The kind of mutation requested for one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Insert a new feature.
    Create,
    /// Replace an existing feature.
    Update { id: String },
    /// Remove an existing feature.
    Delete { id: String },
}

impl MutationKind {
    /// The caller-supplied identifier, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            MutationKind::Create => None,
            MutationKind::Update { id } | MutationKind::Delete { id } => Some(id),
        }
    }
}
