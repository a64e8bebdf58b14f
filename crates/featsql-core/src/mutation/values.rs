//! Staged values of one feature.
//!
//! An external decoder fills a [`ValueContainer`] while it walks a feature
//! document: it opens a row for every repeated nested object and sets column
//! values on the current row of the addressed table. The mutation compiler
//! then reads rows back per parent row.

use crate::error::{Error, Result};
use crate::mapping::{is_path_prefix, TableArena, TableId, TableSchema};
use featsql_proto::ValueOp;
use tracing::trace;

/// One pending row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedRow {
    /// Index of the parent table's row this row belongs to.
    pub parent_row: Option<usize>,
    /// Column values in insertion order; `None` is SQL NULL.
    pub values: Vec<(String, Option<String>)>,
}

impl StagedRow {
    /// Value of a column, `Some(None)` for an explicit NULL.
    pub fn get(&self, column: &str) -> Option<Option<&str>> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_deref())
    }

    fn set(&mut self, column: &str, value: Option<String>) {
        match self.values.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column.to_string(), value)),
        }
    }
}

/// Staging tree of pending values for one feature.
#[derive(Debug, Clone)]
pub struct ValueContainer {
    arena: TableArena,
    rows: Vec<Vec<StagedRow>>,
}

impl ValueContainer {
    /// Create an empty container with one root row.
    pub fn new(root: &TableSchema) -> Self {
        let arena = TableArena::new(root);
        let mut rows = vec![Vec::new(); arena.len()];
        if let Some(root_rows) = rows.first_mut() {
            root_rows.push(StagedRow::default());
        }
        Self { arena, rows }
    }

    pub fn arena(&self) -> &TableArena {
        &self.arena
    }

    /// Open a new row of the table at `path` under the parent's current row.
    ///
    /// Returns the row index within the table.
    pub fn add_row(&mut self, path: &str) -> Result<usize> {
        let table = self
            .arena
            .id_of(path)
            .ok_or_else(|| Error::UnregisteredPath(path.to_string()))?;
        let parent_row = match self.arena.get(table).and_then(|n| n.parent) {
            Some(parent) => Some(
                self.current_row(parent)
                    .ok_or_else(|| Error::UnregisteredPath(path.to_string()))?,
            ),
            None => None,
        };

        let rows = &mut self.rows[table.0];
        rows.push(StagedRow {
            parent_row,
            values: Vec::new(),
        });
        trace!(path = %path, row = rows.len() - 1, "added row");
        Ok(rows.len() - 1)
    }

    /// Set a column on the current row of the deepest table prefixing `path`.
    ///
    /// A table without a row under its parent's current row gets one.
    pub fn add_value(&mut self, path: &str, column: &str, value: Option<String>) -> Result<()> {
        let table = self
            .resolve(path)
            .ok_or_else(|| Error::UnregisteredPath(path.to_string()))?;
        let row = match self.current_row(table) {
            Some(row) => row,
            None => {
                let table_path = self
                    .arena
                    .get(table)
                    .map(|n| n.path.clone())
                    .unwrap_or_default();
                self.add_row(&table_path)?
            }
        };
        self.rows[table.0][row].set(column, value);
        Ok(())
    }

    /// Replay a script of value operations.
    pub fn apply(&mut self, ops: &[ValueOp]) -> Result<()> {
        for op in ops {
            match op {
                ValueOp::Row { path } => {
                    self.add_row(path)?;
                }
                ValueOp::Value {
                    path,
                    column,
                    value,
                } => self.add_value(path, column, Some(value.clone()))?,
                ValueOp::Null { path, column } => self.add_value(path, column, None)?,
            }
        }
        Ok(())
    }

    /// Rows of `table` belonging to row `parent_row` of its parent, by index.
    fn rows_under(&self, table: TableId, parent_row: Option<usize>) -> Vec<usize> {
        self.rows
            .get(table.0)
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .filter(|(_, r)| r.parent_row == parent_row)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of rows of the table at `path` under row `parent_row` of its parent.
    pub fn row_count(&self, path: &str, parent_row: usize) -> Result<usize> {
        let table = self
            .arena
            .id_of(path)
            .ok_or_else(|| Error::UnregisteredPath(path.to_string()))?;
        let parent = self.arena.get(table).and_then(|n| n.parent);
        Ok(self
            .rows_under(table, parent.map(|_| parent_row))
            .len())
    }

    /// Index of the `n`th row of `table` under row `parent_row` of its parent.
    pub fn nth_row(&self, table: TableId, parent_row: usize, n: usize) -> Result<usize> {
        let parent = self.arena.get(table).and_then(|node| node.parent);
        self.rows_under(table, parent.map(|_| parent_row))
            .get(n)
            .copied()
            .ok_or_else(|| Error::RowReconstruction {
                path: self
                    .arena
                    .get(table)
                    .map(|node| node.path.clone())
                    .unwrap_or_default(),
                row: n,
            })
    }

    /// A staged row.
    pub fn row(&self, table: TableId, row: usize) -> Result<&StagedRow> {
        self.rows
            .get(table.0)
            .and_then(|rows| rows.get(row))
            .ok_or_else(|| Error::RowReconstruction {
                path: self
                    .arena
                    .get(table)
                    .map(|n| n.path.clone())
                    .unwrap_or_default(),
                row,
            })
    }

    /// Values of a column across all rows of the table at `path`.
    pub fn related_values(&self, path: &str, column: &str) -> Result<Vec<Option<&str>>> {
        let table = self
            .arena
            .id_of(path)
            .ok_or_else(|| Error::UnregisteredPath(path.to_string()))?;
        Ok(self.rows[table.0]
            .iter()
            .filter_map(|r| r.get(column))
            .collect())
    }

    /// Current row of a table: its last row, if that row belongs to the
    /// parent's current row.
    fn current_row(&self, table: TableId) -> Option<usize> {
        let rows = self.rows.get(table.0)?;
        let last = rows.len().checked_sub(1)?;
        match self.arena.get(table).and_then(|n| n.parent) {
            None => Some(last),
            Some(parent) => {
                let parent_row = self.current_row(parent)?;
                (rows[last].parent_row == Some(parent_row)).then_some(last)
            }
        }
    }

    /// Deepest registered table whose path prefixes `path`.
    fn resolve(&self, path: &str) -> Option<TableId> {
        self.arena
            .ids()
            .filter(|id| {
                self.arena
                    .get(*id)
                    .map(|n| is_path_prefix(&n.path, path))
                    .unwrap_or(false)
            })
            .max_by_key(|id| self.arena.get(*id).map(|n| n.depth).unwrap_or(0))
    }
}
