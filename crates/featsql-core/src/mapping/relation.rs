//! Relations between a table and its parent.

use super::path::JoinType;
use featsql_proto::FilterExpr;
use serde::Serialize;
use std::fmt;

/// Cardinality of the link from a parent table to a child table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    /// The root table; it has no parent.
    None,
    /// Child row shares the parent's primary key.
    OneToOneMerge,
    /// Parent row holds a foreign key to the child's primary key.
    OneToOneReference,
    /// Child rows hold a foreign key to the parent's primary key.
    OneToMany,
    /// Parent and child are linked through a junction table.
    ManyToMany,
}

impl RelationKind {
    /// Check if the child side may repeat per parent row.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }

    /// Get the display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::None => "NONE",
            RelationKind::OneToOneMerge => "ONE_TO_ONE_MERGE",
            RelationKind::OneToOneReference => "ONE_TO_ONE_REFERENCE",
            RelationKind::OneToMany => "ONE_TO_MANY",
            RelationKind::ManyToMany => "MANY_TO_MANY",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The junction table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Junction {
    /// Junction table name.
    pub table: String,
    /// Junction column referencing the source table.
    pub source_field: String,
    /// Junction column referencing the target table.
    pub target_field: String,
    /// Join flavor for the junction itself.
    pub join_type: JoinType,
}

/// One edge of a relation path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationEdge {
    pub kind: RelationKind,
    pub source_table: String,
    pub source_field: String,
    /// Primary key of the source table, needed when writing.
    pub source_primary_key: String,
    pub target_table: String,
    pub target_field: String,
    /// Primary key of the target table.
    pub target_primary_key: String,
    pub junction: Option<Junction>,
    pub join_type: JoinType,
    /// Row filter on the target table, added to the join condition.
    pub target_filter: Option<FilterExpr>,
}

impl RelationEdge {
    /// Number of tables this edge adds to a join chain.
    pub fn table_count(&self) -> usize {
        if self.junction.is_some() {
            2
        } else {
            1
        }
    }

    /// Check if the target filter refers to row numbers.
    pub fn uses_position(&self) -> bool {
        self.target_filter
            .as_ref()
            .map(|f| f.uses_position())
            .unwrap_or(false)
    }
}
