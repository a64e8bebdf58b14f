//! Table schema tree derived from source paths.

use super::path::DEFAULT_KEY;
use super::relation::{RelationEdge, RelationKind};
use featsql_proto::FilterExpr;
use serde::Serialize;

/// How a column's value is selected and interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Plain value.
    Value,
    /// The feature identifier.
    Identifier,
    /// Geometry, selected as WKT.
    Spatial,
    /// Timestamp, selected as ISO text.
    Temporal,
    /// Calendar date.
    Date,
    /// A constant that is selected but never stored.
    Constant(String),
}

/// A column of a table schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Feature property this column is mapped to.
    pub property: String,
    /// Column kind.
    pub kind: ColumnKind,
}

impl Column {
    /// Create a plain value column.
    pub fn new(name: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property: property.into(),
            kind: ColumnKind::Value,
        }
    }

    /// Set the kind.
    pub fn with_kind(mut self, kind: ColumnKind) -> Self {
        self.kind = kind;
        self
    }

    /// Check if this column is written on insert.
    pub fn is_stored(&self) -> bool {
        !matches!(self.kind, ColumnKind::Constant(_))
    }
}

/// A node of the relation tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Table path from the root, e.g. `parcel/[id=parcel_id]address`.
    pub path: String,
    /// Edges from the root to this table; empty for the root.
    pub relation_path: Vec<RelationEdge>,
    pub columns: Vec<Column>,
    pub sort_key: String,
    pub sort_key_unique: bool,
    pub primary_key: String,
    /// Row filter of this table.
    pub filter: Option<FilterExpr>,
    pub children: Vec<TableSchema>,
}

impl TableSchema {
    /// Create a root table schema with default keys.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            relation_path: Vec::new(),
            columns: Vec::new(),
            sort_key: DEFAULT_KEY.to_string(),
            sort_key_unique: true,
            primary_key: DEFAULT_KEY.to_string(),
            filter: None,
            children: Vec::new(),
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a child table.
    pub fn with_child(mut self, child: TableSchema) -> Self {
        self.children.push(child);
        self
    }

    /// The edge from the parent table, if any.
    pub fn relation(&self) -> Option<&RelationEdge> {
        self.relation_path.last()
    }

    /// Cardinality to the parent table.
    pub fn kind(&self) -> RelationKind {
        self.relation()
            .map(|r| r.kind)
            .unwrap_or(RelationKind::None)
    }

    /// Check if this is the root table.
    pub fn is_root(&self) -> bool {
        self.relation_path.is_empty()
    }

    /// All tables of the tree in pre-order.
    pub fn tables(&self) -> Vec<&TableSchema> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a TableSchema>) {
        out.push(self);
        for child in &self.children {
            child.collect(out);
        }
    }

    /// Find a table by its path.
    pub fn find(&self, path: &str) -> Option<&TableSchema> {
        let path = path.trim_start_matches('/');
        self.tables().into_iter().find(|t| t.path == path)
    }

    /// Get a column of this table by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Find the table and column a feature property is mapped to.
    pub fn property(&self, property: &str) -> Option<(&TableSchema, &Column)> {
        self.tables()
            .into_iter()
            .find_map(|t| t.columns.iter().find(|c| c.property == property).map(|c| (t, c)))
    }

    /// The identifier column of the root table, if one is mapped.
    pub fn identifier(&self) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.kind == ColumnKind::Identifier)
    }

    /// Check if every non-root table has a relation path.
    pub fn is_well_formed(&self) -> bool {
        let tables = self.tables();
        let roots = tables
            .iter()
            .filter(|t| t.kind() == RelationKind::None)
            .count();
        roots == 1 && self.is_root() && tables.iter().skip(1).all(|t| !t.relation_path.is_empty())
    }
}
