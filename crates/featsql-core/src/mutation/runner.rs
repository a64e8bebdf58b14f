//! Sequential statement execution.

use super::compiler::{IdMap, Statement, StatementKind};
use crate::error::{Error, Result};
use crate::provider::SqlClient;
use tracing::debug;

/// Runs the statements of one feature write in order.
pub struct MutationRunner;

impl MutationRunner {
    /// Execute `statements` one after another, capturing returned ids.
    ///
    /// Returns the feature id: the id captured for the root row, or the id
    /// returned by a delete.
    pub fn run(client: &dyn SqlClient, statements: &[Statement]) -> Result<Option<String>> {
        let mut ids = IdMap::new();
        let mut feature_id = None;

        for statement in statements {
            let sql = statement.render(&ids)?;
            debug!(kind = %statement.kind, table = %statement.table, sql = %sql, "executing statement");
            let returned = client.execute(&sql)?;

            match (statement.kind, returned) {
                (StatementKind::Delete, None) => {
                    return Err(Error::NotFound(statement.id.clone().unwrap_or_default()))
                }
                (StatementKind::Delete, Some(id)) => feature_id = Some(id),
                (_, Some(id)) => {
                    if let Some(row) = statement.capture {
                        if row.table.0 == 0 {
                            feature_id = Some(id.clone());
                        }
                        ids.insert(row, id);
                    }
                }
                (_, None) => {
                    if let Some(row) = statement.capture {
                        return Err(Error::Internal(format!(
                            "insert into {} returned no id for row {}",
                            statement.table, row.row
                        )));
                    }
                }
            }
        }

        Ok(feature_id)
    }

    /// Render `statements` as if every insert returned its caller id, or else
    /// the next number of a sequence starting at 1.
    pub fn dry_run(statements: &[Statement]) -> Result<Vec<String>> {
        let mut ids = IdMap::new();
        let mut next = 0u64;
        let mut rendered = Vec::with_capacity(statements.len());

        for statement in statements {
            rendered.push(statement.render(&ids)?);
            if let Some(row) = statement.capture {
                let id = match &statement.id {
                    Some(id) => id.clone(),
                    None => {
                        next += 1;
                        next.to_string()
                    }
                };
                ids.insert(row, id);
            }
        }
        Ok(rendered)
    }
}
