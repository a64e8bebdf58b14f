//! Mutation statements.
//!
//! A feature write is an ordered list of [`Statement`]s. Statements render
//! against an [`IdMap`] that collects the ids returned by earlier inserts, so
//! a child row can reference its parent and a junction row both ends.
//! Statements must run in the order they are emitted.

use super::values::{StagedRow, ValueContainer};
use crate::config::DEFAULT_NATIVE_SRID;
use crate::error::{Error, Result};
use crate::mapping::{ColumnKind, RelationKind, TableArena, TableId, TableSchema};
use crate::sql::SqlDialect;
use featsql_proto::MutationKind;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// What a statement does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Remove the root row of an existing feature.
    Delete,
    /// Insert one row.
    Insert,
    /// Link a many-to-many child to its parent.
    JunctionInsert,
    /// Point a parent row at a referenced child.
    ForeignKeyUpdate,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Delete => write!(f, "DELETE"),
            StatementKind::Insert => write!(f, "INSERT"),
            StatementKind::JunctionInsert => write!(f, "JUNCTION INSERT"),
            StatementKind::ForeignKeyUpdate => write!(f, "FOREIGN KEY UPDATE"),
        }
    }
}

/// A staged row of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowRef {
    pub table: TableId,
    pub row: usize,
}

impl RowRef {
    pub fn new(table: TableId, row: usize) -> Self {
        Self { table, row }
    }
}

/// Ids returned by the inserts of one feature.
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    ids: HashMap<RowRef, String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row: RowRef, id: impl Into<String>) {
        self.ids.insert(row, id.into());
    }

    /// The id captured for a row.
    pub fn get(&self, row: RowRef) -> Result<&str> {
        self.ids.get(&row).map(String::as_str).ok_or_else(|| {
            Error::Internal(format!(
                "no id captured for row {} of table {}",
                row.row, row.table.0
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

type Render = Box<dyn Fn(&IdMap) -> Result<String> + Send + Sync>;

/// One statement of a feature write.
pub struct Statement {
    pub kind: StatementKind,
    pub table: String,
    /// Row whose returned id this statement captures.
    pub capture: Option<RowRef>,
    /// Caller-supplied id the statement addresses.
    pub id: Option<String>,
    render: Render,
}

impl Statement {
    /// Render the SQL text with the ids captured so far.
    pub fn render(&self, ids: &IdMap) -> Result<String> {
        (self.render)(ids)
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("kind", &self.kind)
            .field("table", &self.table)
            .field("capture", &self.capture)
            .field("id", &self.id)
            .finish()
    }
}

/// An insert value: a literal known now or an id captured later.
#[derive(Debug, Clone)]
enum SqlValue {
    Literal(String),
    Id(RowRef),
}

impl SqlValue {
    fn render(&self, ids: &IdMap) -> Result<String> {
        match self {
            SqlValue::Literal(sql) => Ok(sql.clone()),
            SqlValue::Id(row) => Ok(id_literal(ids.get(*row)?)),
        }
    }
}

/// Compiles feature writes for one relation tree.
pub struct MutationCompiler<'a> {
    tables: Vec<&'a TableSchema>,
    arena: TableArena,
    dialect: &'a dyn SqlDialect,
    srid: u32,
}

impl<'a> MutationCompiler<'a> {
    pub fn new(root: &'a TableSchema, dialect: &'a dyn SqlDialect) -> Self {
        Self {
            tables: root.tables(),
            arena: TableArena::new(root),
            dialect,
            srid: DEFAULT_NATIVE_SRID,
        }
    }

    /// Set the SRID of inserted geometries.
    pub fn with_srid(mut self, srid: u32) -> Self {
        self.srid = srid;
        self
    }

    /// Statements for one feature write.
    ///
    /// `Delete` ignores the staged values. `Update` deletes the root row and
    /// inserts the whole feature again under the caller's id.
    pub fn compile(&self, kind: &MutationKind, values: &ValueContainer) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        match kind {
            MutationKind::Delete { id } => statements.push(self.delete(id)?),
            MutationKind::Create => self.emit(self.arena.root(), 0, None, values, &mut statements)?,
            MutationKind::Update { id } => {
                statements.push(self.delete(id)?);
                self.emit(self.arena.root(), 0, Some(id), values, &mut statements)?;
            }
        }
        debug!(statements = statements.len(), "compiled mutation");
        Ok(statements)
    }

    /// The single statement removing a feature.
    pub fn delete(&self, id: &str) -> Result<Statement> {
        let root = self.table(self.arena.root())?;
        let column = identifier_column(root).to_string();
        let sql = format!(
            "DELETE FROM {} WHERE {}={} RETURNING {}",
            root.name,
            column,
            id_literal(id),
            column
        );
        Ok(Statement {
            kind: StatementKind::Delete,
            table: root.name.clone(),
            capture: None,
            id: Some(id.to_string()),
            render: Box::new(move |_: &IdMap| -> Result<String> { Ok(sql.clone()) }),
        })
    }

    /// Insert a row, then link it, then its children row by row.
    fn emit(
        &self,
        table: TableId,
        row: usize,
        id: Option<&str>,
        values: &ValueContainer,
        out: &mut Vec<Statement>,
    ) -> Result<()> {
        let schema = self.table(table)?;
        let staged = values.row(table, row)?;
        let current = RowRef::new(table, row);
        let parent = match (self.arena.get(table).and_then(|n| n.parent), staged.parent_row) {
            (Some(parent), Some(parent_row)) => Some(RowRef::new(parent, parent_row)),
            (Some(_), None) => {
                return Err(Error::RowReconstruction {
                    path: schema.path.clone(),
                    row,
                })
            }
            _ => None,
        };

        out.push(self.insert(schema, current, staged, parent, id));

        if let (Some(edge), Some(parent)) = (schema.relation(), parent) {
            match edge.kind {
                RelationKind::ManyToMany => {
                    if let Some(junction) = &edge.junction {
                        let junction_table = junction.table.clone();
                        let sql = format!(
                            "INSERT INTO {} ({},{}) VALUES ",
                            junction.table, junction.source_field, junction.target_field
                        );
                        out.push(Statement {
                            kind: StatementKind::JunctionInsert,
                            table: junction_table,
                            capture: None,
                            id: None,
                            render: Box::new(move |ids: &IdMap| -> Result<String> {
                                Ok(format!(
                                    "{}({},{})",
                                    sql,
                                    id_literal(ids.get(parent)?),
                                    id_literal(ids.get(current)?)
                                ))
                            }),
                        });
                    }
                }
                RelationKind::OneToOneReference => {
                    let sql = format!("UPDATE {} SET {}=", edge.source_table, edge.source_field);
                    let key = edge.source_primary_key.clone();
                    out.push(Statement {
                        kind: StatementKind::ForeignKeyUpdate,
                        table: edge.source_table.clone(),
                        capture: None,
                        id: None,
                        render: Box::new(move |ids: &IdMap| -> Result<String> {
                            Ok(format!(
                                "{}{} WHERE {}={}",
                                sql,
                                id_literal(ids.get(current)?),
                                key,
                                id_literal(ids.get(parent)?)
                            ))
                        }),
                    });
                }
                RelationKind::None | RelationKind::OneToOneMerge | RelationKind::OneToMany => {}
            }
        }

        let children = self
            .arena
            .get(table)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in children {
            let path = &self.table(child)?.path;
            for n in 0..values.row_count(path, row)? {
                let child_row = values.nth_row(child, row, n)?;
                self.emit(child, child_row, None, values, out)?;
            }
        }
        Ok(())
    }

    fn insert(
        &self,
        schema: &TableSchema,
        current: RowRef,
        staged: &StagedRow,
        parent: Option<RowRef>,
        id: Option<&str>,
    ) -> Statement {
        let mut columns: Vec<String> = Vec::new();
        let mut sql_values: Vec<SqlValue> = Vec::new();

        if let Some(id) = id {
            columns.push(identifier_column(schema).to_string());
            sql_values.push(SqlValue::Literal(id_literal(id)));
        }

        if let (Some(edge), Some(parent)) = (schema.relation(), parent) {
            if matches!(
                edge.kind,
                RelationKind::OneToOneMerge | RelationKind::OneToMany
            ) {
                columns.push(edge.target_field.clone());
                sql_values.push(SqlValue::Id(parent));
            }
        }

        for column in schema.columns.iter().filter(|c| c.is_stored()) {
            if column.name == schema.primary_key || columns.contains(&column.name) {
                continue;
            }
            let Some(value) = staged.get(&column.name) else {
                continue;
            };
            columns.push(column.name.clone());
            sql_values.push(SqlValue::Literal(match (value, &column.kind) {
                (None, _) => "NULL".to_string(),
                (Some(wkt), ColumnKind::Spatial) => self
                    .dialect
                    .geometry_literal(&self.dialect.escape_string(wkt), self.srid),
                (Some(text), _) => format!("'{}'", self.dialect.escape_string(text)),
            }));
        }

        let head = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", schema.name)
        } else {
            format!("INSERT INTO {} ({}) VALUES ", schema.name, columns.join(","))
        };
        let returning = format!(" RETURNING {}", schema.primary_key);
        let has_values = !columns.is_empty();

        Statement {
            kind: StatementKind::Insert,
            table: schema.name.clone(),
            capture: Some(current),
            id: id.map(str::to_string),
            render: Box::new(move |ids: &IdMap| -> Result<String> {
                if !has_values {
                    return Ok(format!("{}{}", head, returning));
                }
                let rendered = sql_values
                    .iter()
                    .map(|v| v.render(ids))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{}({}){}", head, rendered.join(","), returning))
            }),
        }
    }

    fn table(&self, id: TableId) -> Result<&'a TableSchema> {
        self.tables
            .get(id.0)
            .copied()
            .ok_or_else(|| Error::Internal(format!("unknown table id {}", id.0)))
    }
}

/// Column holding the feature id: the identifier column, else the primary key.
fn identifier_column(schema: &TableSchema) -> &str {
    schema
        .identifier()
        .map(|c| c.name.as_str())
        .unwrap_or(schema.primary_key.as_str())
}

/// Ids render bare when numeric and quoted otherwise.
pub fn id_literal(id: &str) -> String {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        id.to_string()
    } else {
        format!("'{}'", id.replace('\'', "''"))
    }
}
