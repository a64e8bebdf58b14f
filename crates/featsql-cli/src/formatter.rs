//! Output formatters for trees, queries and statements.

use clap::ValueEnum;
use comfy_table::Table;
use featsql_core::mapping::{ColumnKind, TableSchema};
use serde_json::json;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format a relation tree, one line per table.
    fn format_tree(&self, root: &TableSchema) -> String;

    /// Format labelled SQL queries.
    fn format_queries(&self, queries: &[(String, String)]) -> String;

    /// Format statements as (kind, table, sql).
    fn format_statements(&self, statements: &[(String, String, String)]) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_tree(&self, root: &TableSchema) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Path", "Table", "Relation", "Sort key", "Columns"]);

        for schema in root.tables() {
            let depth = schema.relation_path.len();
            table.add_row(vec![
                format!("{}{}", "  ".repeat(depth), schema.path),
                schema.name.clone(),
                schema.kind().to_string(),
                sort_key(schema),
                schema
                    .columns
                    .iter()
                    .map(column_label)
                    .collect::<Vec<_>>()
                    .join(", "),
            ]);
        }

        table.to_string()
    }

    fn format_queries(&self, queries: &[(String, String)]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Query", "SQL"]);
        for (label, sql) in queries {
            table.add_row(vec![label, sql]);
        }
        table.to_string()
    }

    fn format_statements(&self, statements: &[(String, String, String)]) -> String {
        if statements.is_empty() {
            return "No statements".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["#", "Kind", "Table", "SQL"]);
        for (i, (kind, name, sql)) in statements.iter().enumerate() {
            table.add_row(vec![(i + 1).to_string(), kind.clone(), name.clone(), sql.clone()]);
        }
        table.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_tree(&self, root: &TableSchema) -> String {
        let tables: Vec<serde_json::Value> = root
            .tables()
            .into_iter()
            .map(|schema| {
                json!({
                    "path": schema.path,
                    "table": schema.name,
                    "kind": schema.kind().as_str(),
                    "sort_key": sort_key(schema),
                    "primary_key": schema.primary_key,
                    "relation_path": schema.relation_path,
                    "columns": schema.columns,
                })
            })
            .collect();
        serde_json::to_string_pretty(&tables).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_queries(&self, queries: &[(String, String)]) -> String {
        let queries: Vec<serde_json::Value> = queries
            .iter()
            .map(|(label, sql)| json!({ "query": label, "sql": sql }))
            .collect();
        serde_json::to_string_pretty(&queries).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_statements(&self, statements: &[(String, String, String)]) -> String {
        let statements: Vec<serde_json::Value> = statements
            .iter()
            .map(|(kind, table, sql)| json!({ "kind": kind, "table": table, "sql": sql }))
            .collect();
        serde_json::to_string_pretty(&statements).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_error(&self, error: &str) -> String {
        json!({ "error": error }).to_string()
    }
}

fn sort_key(schema: &TableSchema) -> String {
    if schema.sort_key_unique {
        schema.sort_key.clone()
    } else {
        format!("{} (row number)", schema.sort_key)
    }
}

fn column_label(column: &featsql_core::mapping::Column) -> String {
    let kind = match &column.kind {
        ColumnKind::Value => return column.name.clone(),
        ColumnKind::Identifier => "id",
        ColumnKind::Spatial => "geometry",
        ColumnKind::Temporal => "datetime",
        ColumnKind::Date => "date",
        ColumnKind::Constant(_) => "constant",
    };
    format!("{} [{}]", column.name, kind)
}
