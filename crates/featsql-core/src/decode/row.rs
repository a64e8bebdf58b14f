//! Rows as delivered by the row source.

use crate::error::ExecutionError;

/// Storage class of a value as the row source typed it.
///
/// Sort keys compare by class the way SQL orders a column: numbers
/// numerically, text and blobs bytewise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueKind {
    Integer,
    Real,
    #[default]
    Text,
    /// Hex encoded bytes.
    Blob,
}

impl ValueKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Integer | ValueKind::Real)
    }
}

/// One result row; every value is rendered as text, `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlRow {
    pub values: Vec<Option<String>>,
    /// Storage class per value; missing entries are text.
    pub kinds: Vec<ValueKind>,
}

impl SqlRow {
    /// A row of text values.
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self {
            values,
            kinds: Vec::new(),
        }
    }

    /// Build a text row from borrowed values.
    pub fn of(values: &[Option<&str>]) -> Self {
        Self::new(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    /// Set the storage class of each value.
    pub fn with_kinds(mut self, kinds: Vec<ValueKind>) -> Self {
        self.kinds = kinds;
        self
    }

    /// Value at `index`; `None` for NULL or a missing column.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    /// Storage class of the value at `index`.
    pub fn kind(&self, index: usize) -> ValueKind {
        self.kinds.get(index).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An ordered stream of rows from one query.
pub type RowStream<'a> = Box<dyn Iterator<Item = Result<SqlRow, ExecutionError>> + Send + 'a>;

/// Build a stream over rows already in memory.
pub fn row_stream<'a>(rows: Vec<SqlRow>) -> RowStream<'a> {
    Box::new(rows.into_iter().map(Ok))
}

/// A row tagged with the join group it was read for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    /// Index of the group's value query.
    pub group: usize,
    pub row: SqlRow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_access() {
        let row = SqlRow::of(&[Some("1"), None]);
        assert_eq!(row.get(0), Some("1"));
        assert_eq!(row.get(1), None);
        assert_eq!(row.get(5), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_kinds_default_to_text() {
        let row = SqlRow::of(&[Some("1"), Some("a")]).with_kinds(vec![ValueKind::Integer]);
        assert_eq!(row.kind(0), ValueKind::Integer);
        assert_eq!(row.kind(1), ValueKind::Text);
        assert!(row.kind(0).is_numeric());
        assert!(!ValueKind::Blob.is_numeric());
    }

    #[test]
    fn test_row_stream() {
        let rows: Vec<SqlRow> = row_stream(vec![SqlRow::of(&[Some("a")])])
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows, vec![SqlRow::of(&[Some("a")])]);
    }
}
