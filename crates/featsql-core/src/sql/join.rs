//! JOIN clause generation along relation paths.

use super::filter::FilterCompiler;
use crate::error::Result;
use crate::mapping::{JoinType, RelationEdge};

/// Column exposed by row-numbered join targets.
pub const ROW_NUMBER: &str = "row_number";

/// What to add to the plain key joins.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinOptions<'a> {
    /// Append each edge's target filter to its ON clause.
    pub relation_filters: bool,
    /// Root row filter, compiled for alias `A`, restricting row-numbered sub-selects.
    pub root_filter: Option<&'a str>,
}

/// Builds JOIN clauses for relation paths.
pub struct JoinGenerator<'a> {
    filters: &'a FilterCompiler<'a>,
}

struct JoinSide<'s> {
    table: &'s str,
    alias: &'s str,
    field: &'s str,
}

impl<'a> JoinGenerator<'a> {
    pub fn new(filters: &'a FilterCompiler<'a>) -> Self {
        Self { filters }
    }

    /// JOIN clauses for `edges`, one per table after the root.
    ///
    /// `aliases` must hold one alias per table of the chain, as returned by
    /// [`AliasGenerator::chain`](super::alias::AliasGenerator::chain).
    pub fn joins(
        &self,
        edges: &[RelationEdge],
        aliases: &[String],
        options: JoinOptions<'_>,
    ) -> Result<Vec<String>> {
        let mut joins = Vec::new();
        let mut source = 0;

        for edge in edges {
            let target = source + edge.table_count();
            let (Some(source_alias), Some(target_alias)) = (aliases.get(source), aliases.get(target))
            else {
                break;
            };

            let filter = match (&edge.target_filter, options.relation_filters) {
                (Some(filter), true) => Some(self.filters.compile_row_filter(filter, target_alias)?),
                _ => None,
            };
            let row_numbered = options.relation_filters && edge.uses_position();

            match &edge.junction {
                Some(junction) => {
                    let junction_alias = &aliases[source + 1];
                    let junction_type = if junction.join_type == JoinType::Left {
                        JoinType::Left
                    } else {
                        edge.join_type
                    };
                    joins.push(to_join(
                        JoinSide {
                            table: &edge.source_table,
                            alias: source_alias,
                            field: &edge.source_field,
                        },
                        JoinSide {
                            table: &junction.table,
                            alias: junction_alias,
                            field: &junction.source_field,
                        },
                        junction_type,
                        None,
                        false,
                        None,
                    ));
                    joins.push(to_join(
                        JoinSide {
                            table: &junction.table,
                            alias: junction_alias,
                            field: &junction.target_field,
                        },
                        JoinSide {
                            table: &edge.target_table,
                            alias: target_alias,
                            field: &edge.target_field,
                        },
                        edge.join_type,
                        filter.as_deref(),
                        row_numbered,
                        None,
                    ));
                }
                None => {
                    joins.push(to_join(
                        JoinSide {
                            table: &edge.source_table,
                            alias: source_alias,
                            field: &edge.source_field,
                        },
                        JoinSide {
                            table: &edge.target_table,
                            alias: target_alias,
                            field: &edge.target_field,
                        },
                        edge.join_type,
                        filter.as_deref(),
                        row_numbered,
                        if source == 0 { options.root_filter } else { None },
                    ));
                }
            }
            source = target;
        }

        Ok(joins)
    }
}

fn to_join(
    source: JoinSide<'_>,
    target: JoinSide<'_>,
    join_type: JoinType,
    filter: Option<&str>,
    row_numbered: bool,
    source_filter: Option<&str>,
) -> String {
    let kind = join_type.as_sql_prefix();
    let additional = filter.map(|f| format!(" AND ({})", f)).unwrap_or_default();

    let target_table = if row_numbered {
        let restriction = source_filter
            .map(|f| format!(" WHERE {} ORDER BY 1", f))
            .unwrap_or_default();
        format!(
            "(SELECT A.{sf} AS A{sf}, B.*, {rn}() OVER (PARTITION BY B.{tf} ORDER BY B.{tf}) AS {rn} FROM {st} A {kind}JOIN {tt} B ON (A.{sf}=B.{tf}){restriction})",
            sf = source.field,
            tf = target.field,
            st = source.table,
            tt = target.table,
            rn = ROW_NUMBER,
            kind = kind,
            restriction = restriction,
        )
    } else {
        target.table.to_string()
    };

    format!(
        "{}JOIN {} {} ON ({}.{}={}.{}{})",
        kind, target_table, target.alias, source.alias, source.field, target.alias, target.field, additional
    )
}
