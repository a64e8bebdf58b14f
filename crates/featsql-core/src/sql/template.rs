//! Query templates.
//!
//! Every feature type compiles to one meta query, which yields the page's
//! key range and counts, and one value query per join group. A join group
//! is the root table or a nested table with columns; its value query joins
//! the group's table along its relation path and selects one sort key per
//! table of the chain followed by the group's columns.

use super::alias::{alias, table_aliases, AliasGenerator};
use super::dialect::SqlDialect;
use super::filter::FilterCompiler;
use super::join::{JoinGenerator, JoinOptions};
use crate::config::{ProviderConfig, DEFAULT_NATIVE_SRID};
use crate::error::Result;
use crate::mapping::{Column, ColumnKind, FeatureTypeMapping, RelationTreeDeriver, TableSchema};
use featsql_proto::{FilterExpr, SortKey, Value};
use tracing::debug;

/// Name of the root sort key column.
pub const SKEY: &str = "SKEY";
/// Prefix of caller sort key columns.
pub const CSKEY: &str = "CSKEY";

/// Request parameters applied to a template.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow<'q> {
    /// Maximum number of features, 0 for no limit.
    pub limit: usize,
    pub offset: usize,
    /// Caller sort keys on root columns.
    pub sort_keys: &'q [SortKey],
    pub filter: Option<&'q FilterExpr>,
    /// The filter is a direct identifier lookup.
    pub id_lookup: bool,
    /// First and last root sort key of the page, as returned by the meta query.
    pub key_range: Option<(&'q Value, &'q Value)>,
}

impl<'q> QueryWindow<'q> {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            ..Self::default()
        }
    }

    pub fn with_sort_keys(mut self, sort_keys: &'q [SortKey]) -> Self {
        self.sort_keys = sort_keys;
        self
    }

    pub fn with_filter(mut self, filter: Option<&'q FilterExpr>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_id_lookup(mut self, id_lookup: bool) -> Self {
        self.id_lookup = id_lookup;
        self
    }

    pub fn with_key_range(mut self, min: &'q Value, max: &'q Value) -> Self {
        self.key_range = Some((min, max));
        self
    }

    fn paging(&self, dialect: &dyn SqlDialect) -> String {
        let mut paging = String::new();
        if self.limit > 0 {
            paging.push_str(&dialect.limit(self.limit));
        }
        if self.offset > 0 {
            paging.push_str(&dialect.offset(self.offset));
        }
        paging
    }
}

/// One sort key column of a value query.
#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    /// Table path of the sorted table; rows of different groups sharing a
    /// table are correlated through it.
    pub name: String,
    /// Select expression including its `AS` label.
    pub sql: String,
}

/// Template for the paging and count query.
#[derive(Debug, Clone)]
pub struct MetaQueryTemplate {
    table: String,
    sort_key: String,
    compute_number_matched: bool,
}

impl MetaQueryTemplate {
    fn new(root: &TableSchema, compute_number_matched: bool) -> Self {
        Self {
            table: root.name.clone(),
            sort_key: root.sort_key.clone(),
            compute_number_matched,
        }
    }

    /// Render the query. Its single row holds `minKey`, `maxKey`,
    /// `numberReturned` and `numberMatched`.
    pub fn render(&self, compiler: &FilterCompiler<'_>, window: &QueryWindow<'_>) -> Result<String> {
        let dialect = compiler.dialect();
        let filter = compiler.where_filter(window.filter, 0)?;
        let where_clause = filter.map(|f| format!(" WHERE {}", f)).unwrap_or_default();

        let caller = caller_sort(compiler, window.sort_keys)?;
        let mut columns: Vec<String> = caller
            .iter()
            .enumerate()
            .map(|(i, key)| caller_sort_column("A", &key.column, i))
            .collect();
        columns.push(format!("A.{} AS {}", self.sort_key, SKEY));

        let mut order_by: Vec<String> = caller
            .iter()
            .enumerate()
            .map(|(i, key)| format!("{}_{}{}", CSKEY, i, key.direction))
            .collect();
        order_by.push(SKEY.to_string());

        let min_max = if window.sort_keys.is_empty() {
            format!("MIN({0}) AS minKey, MAX({0}) AS maxKey", SKEY)
        } else {
            "NULL AS minKey, NULL AS maxKey".to_string()
        };

        let number_returned = format!(
            "SELECT {}, count(*) AS numberReturned FROM (SELECT {} FROM {} A{} ORDER BY {}{}) AS IDS",
            min_max,
            columns.join(", "),
            self.table,
            where_clause,
            order_by.join(", "),
            window.paging(dialect)
        );
        let number_matched = if self.compute_number_matched {
            format!(
                "SELECT count(*) AS numberMatched FROM (SELECT A.{} AS {} FROM {} A{} ORDER BY 1) AS IDS",
                self.sort_key, SKEY, self.table, where_clause
            )
        } else {
            format!("SELECT {} AS numberMatched", dialect.bigint(-1))
        };

        let sql = format!(
            "WITH NR AS ({}), NM AS ({}) SELECT * FROM NR, NM",
            number_returned, number_matched
        );
        debug!(table = %self.table, sql = %sql, "rendered meta query");
        Ok(sql)
    }
}

/// Template for the rows of one join group.
#[derive(Debug, Clone)]
pub struct ValueQueryTemplate {
    path: String,
    root_table: String,
    root_sort_key: String,
    root_sort_key_unique: bool,
    sort_fields: Vec<SortField>,
    select: Vec<String>,
    columns: Vec<Column>,
    joins: Vec<String>,
}

impl ValueQueryTemplate {
    fn new(
        chain: &[&TableSchema],
        compiler: &FilterCompiler<'_>,
        root_filter: Option<&str>,
    ) -> Result<Self> {
        let (Some(root), Some(table)) = (chain.first(), chain.last()) else {
            return Err(crate::error::Error::Internal("empty table chain".to_string()));
        };
        let dialect = compiler.dialect();
        let edges = &table.relation_path;
        let aliases = AliasGenerator::chain(edges, 0);
        let chain_aliases = table_aliases(edges, &aliases);

        let sort_fields = chain
            .iter()
            .zip(chain_aliases.iter())
            .enumerate()
            .map(|(i, (t, a))| {
                let label = if i == 0 {
                    SKEY.to_string()
                } else {
                    format!("{}_{}", SKEY, i)
                };
                let sql = if t.sort_key_unique {
                    format!("{}.{} AS {}", a, t.sort_key, label)
                } else {
                    format!("ROW_NUMBER() OVER (ORDER BY {}.{}) AS {}", a, t.sort_key, label)
                };
                SortField {
                    name: t.path.clone(),
                    sql,
                }
            })
            .collect();

        let leaf = chain_aliases.last().copied().unwrap_or("A");
        let columns: Vec<Column> = table.columns.clone();
        let select = columns
            .iter()
            .map(|c| select_column(dialect, leaf, c))
            .collect();

        let joins = JoinGenerator::new(compiler).joins(
            edges,
            &aliases,
            JoinOptions {
                relation_filters: true,
                root_filter,
            },
        )?;

        Ok(Self {
            path: table.path.clone(),
            root_table: root.name.clone(),
            root_sort_key: root.sort_key.clone(),
            root_sort_key_unique: root.sort_key_unique,
            sort_fields,
            select,
            columns,
            joins,
        })
    }

    /// Table path of the group's table.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Chain sort keys, root first; caller keys precede them in each row.
    pub fn sort_fields(&self) -> &[SortField] {
        &self.sort_fields
    }

    /// Columns following the sort keys in each row, in select order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Render the query.
    pub fn render(&self, compiler: &FilterCompiler<'_>, window: &QueryWindow<'_>) -> Result<String> {
        let dialect = compiler.dialect();
        let caller_keys = caller_sort(compiler, window.sort_keys)?;
        let filter = compiler.where_filter(window.filter, 0)?;

        let mut conditions = Vec::new();
        if let (Some((min, max)), true, false) =
            (window.key_range, caller_keys.is_empty(), window.id_lookup)
        {
            conditions.push(format!(
                "(A.{sk} >= {min} AND A.{sk} <= {max})",
                sk = self.root_sort_key,
                min = key_literal(dialect, min),
                max = key_literal(dialect, max)
            ));
        }
        if let Some(filter) = filter {
            conditions.push(if window.id_lookup {
                filter
            } else {
                format!("({})", filter)
            });
        }

        let paged = !caller_keys.is_empty() && (window.limit > 0 || window.offset > 0);
        let mut trailing = String::new();
        let mut where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        if paged && self.joins.is_empty() {
            trailing = window.paging(dialect);
        } else if paged {
            where_clause = format!(" WHERE {}", self.paged_roots(compiler, window, &caller_keys)?);
        }

        let mut select: Vec<String> = caller_keys
            .iter()
            .enumerate()
            .map(|(i, key)| caller_sort_column("A", &key.column, i))
            .collect();
        select.extend(self.sort_fields.iter().map(|f| f.sql.clone()));
        select.extend(self.select.iter().cloned());

        let order_by: Vec<String> = (1..=caller_keys.len() + self.sort_fields.len())
            .map(|i| match caller_keys.get(i - 1) {
                Some(key) => format!("{}{}", i, key.direction),
                None => i.to_string(),
            })
            .collect();

        let joins = if self.joins.is_empty() {
            String::new()
        } else {
            format!(" {}", self.joins.join(" "))
        };

        let sql = format!(
            "SELECT {} FROM {} A{}{} ORDER BY {}{}",
            select.join(", "),
            self.root_table,
            joins,
            where_clause,
            order_by.join(","),
            trailing
        );
        debug!(path = %self.path, sql = %sql, "rendered value query");
        Ok(sql)
    }

    /// Restrict the root rows to the page before the joins fan them out.
    fn paged_roots(
        &self,
        compiler: &FilterCompiler<'_>,
        window: &QueryWindow<'_>,
        caller_keys: &[CallerSort],
    ) -> Result<String> {
        let nested = alias(1, 0);
        let filter = compiler
            .where_filter(window.filter, 1)?
            .map(|f| format!(" WHERE {}", f))
            .unwrap_or_default();

        let mut order_by: Vec<String> = caller_keys
            .iter()
            .map(|key| format!("{}.{}{}", nested, key.column, key.direction))
            .collect();
        if self.root_sort_key_unique {
            order_by.push(format!("{}.{}", nested, self.root_sort_key));
        }

        Ok(format!(
            "(A.{sk} IN (SELECT {n}.{sk} FROM {table} {n}{filter} ORDER BY {order}{paging}))",
            sk = self.root_sort_key,
            n = nested,
            table = self.root_table,
            filter = filter,
            order = order_by.join(","),
            paging = window.paging(compiler.dialect()),
        ))
    }
}

/// All query templates of one feature type.
pub struct QueryTemplates {
    feature_type: String,
    root: TableSchema,
    dialect: Box<dyn SqlDialect>,
    srid: u32,
    collation: Option<String>,
    meta: MetaQueryTemplate,
    values: Vec<ValueQueryTemplate>,
}

impl QueryTemplates {
    /// Build templates for a derived relation tree.
    pub fn new(
        feature_type: impl Into<String>,
        root: TableSchema,
        dialect: Box<dyn SqlDialect>,
    ) -> Result<Self> {
        let mut templates = Self {
            feature_type: feature_type.into(),
            meta: MetaQueryTemplate::new(&root, true),
            root,
            dialect,
            srid: DEFAULT_NATIVE_SRID,
            collation: None,
            values: vec![],
        };
        templates.rebuild()?;
        Ok(templates)
    }

    /// Derive the relation tree of `mapping` and build its templates.
    pub fn from_mapping(mapping: &FeatureTypeMapping, config: &ProviderConfig) -> Result<Self> {
        let root = RelationTreeDeriver::derive_mapping(mapping)?;
        let mut templates = Self::new(mapping.name.clone(), root, config.dialect.dialect())?;
        templates.srid = config.native_srid;
        templates.collation = config.accenti_collation.clone();
        templates.meta.compute_number_matched = config.compute_number_matched;
        templates.rebuild()?;
        Ok(templates)
    }

    /// Toggle the unrestricted `numberMatched` count.
    pub fn with_number_matched(mut self, enabled: bool) -> Self {
        self.meta.compute_number_matched = enabled;
        self
    }

    fn rebuild(&mut self) -> Result<()> {
        let compiler = self.compiler();
        let root_filter = self
            .root
            .filter
            .as_ref()
            .map(|f| compiler.compile_row_filter(f, "A"))
            .transpose()?;

        let mut values = Vec::new();
        let mut chain = Vec::new();
        collect_groups(&self.root, &mut chain, &mut |chain| {
            values.push(ValueQueryTemplate::new(chain, &compiler, root_filter.as_deref())?);
            Ok(())
        })?;

        debug!(
            feature_type = %self.feature_type,
            dialect = self.dialect.name(),
            groups = values.len(),
            "built query templates"
        );
        self.values = values;
        Ok(())
    }

    pub fn feature_type(&self) -> &str {
        &self.feature_type
    }

    pub fn root(&self) -> &TableSchema {
        &self.root
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// Filter compiler for this feature type.
    pub fn compiler(&self) -> FilterCompiler<'_> {
        FilterCompiler::new(&self.root, self.dialect.as_ref())
            .with_srid(self.srid)
            .with_collation(self.collation.as_deref())
    }

    pub fn meta_template(&self) -> &MetaQueryTemplate {
        &self.meta
    }

    /// Value templates in pre-order of their tables.
    pub fn value_templates(&self) -> &[ValueQueryTemplate] {
        &self.values
    }

    pub fn meta_query(&self, window: &QueryWindow<'_>) -> Result<String> {
        self.meta.render(&self.compiler(), window)
    }

    pub fn value_queries(&self, window: &QueryWindow<'_>) -> Result<Vec<String>> {
        let compiler = self.compiler();
        self.values
            .iter()
            .map(|t| t.render(&compiler, window))
            .collect()
    }
}

/// Visit the chain of every join group in pre-order.
fn collect_groups<'t, F>(table: &'t TableSchema, chain: &mut Vec<&'t TableSchema>, visit: &mut F) -> Result<()>
where
    F: FnMut(&[&'t TableSchema]) -> Result<()>,
{
    chain.push(table);
    if table.is_root() || !table.columns.is_empty() {
        visit(chain.as_slice())?;
    }
    for child in &table.children {
        collect_groups(child, chain, visit)?;
    }
    chain.pop();
    Ok(())
}

/// A caller sort key resolved to its root column.
struct CallerSort {
    column: String,
    /// `ORDER BY` suffix: direction and NULL placement.
    direction: String,
}

fn caller_sort(compiler: &FilterCompiler<'_>, keys: &[SortKey]) -> Result<Vec<CallerSort>> {
    let dialect = compiler.dialect();
    keys.iter()
        .map(|key| {
            let descending = key.is_descending();
            Ok(CallerSort {
                column: compiler.sort_column(&key.field)?.to_string(),
                direction: format!(
                    "{}{}",
                    if descending { " DESC" } else { "" },
                    dialect.null_ordering(descending)
                ),
            })
        })
        .collect()
}

fn caller_sort_column(alias: &str, column: &str, index: usize) -> String {
    format!("{}.{} AS {}_{}", alias, column, CSKEY, index)
}

fn select_column(dialect: &dyn SqlDialect, alias: &str, column: &Column) -> String {
    let qualified = format!("{}.{}", alias, column.name);
    match &column.kind {
        ColumnKind::Constant(value) => {
            format!("'{}' AS {}", dialect.escape_string(value), column.name)
        }
        ColumnKind::Spatial => dialect.wkt(&qualified),
        ColumnKind::Temporal => dialect.datetime(&qualified),
        ColumnKind::Date => dialect.date(&qualified),
        ColumnKind::Value | ColumnKind::Identifier => qualified,
    }
}

fn key_literal(dialect: &dyn SqlDialect, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => format!("'{}'", dialect.escape_string(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{PropertyMapping, PropertyRole};
    use crate::sql::dialect::{GeoPackage, PostGis};
    use pretty_assertions::assert_eq;

    fn parcels() -> FeatureTypeMapping {
        FeatureTypeMapping::new("parcels", "parcel")
            .with_property(PropertyMapping::new("id", "id").with_role(PropertyRole::Id))
            .with_property(PropertyMapping::new("geometry", "geom").with_role(PropertyRole::Geometry))
            .with_property(PropertyMapping::new("city", "[id=parcel_id]address/city"))
    }

    /// Parcels with a `name` property stored in column `parcel_name`.
    fn named_parcels() -> FeatureTypeMapping {
        parcels().with_property(PropertyMapping::new("name", "parcel_name"))
    }

    fn templates(mapping: &FeatureTypeMapping) -> QueryTemplates {
        let root = RelationTreeDeriver::derive_mapping(mapping).unwrap();
        QueryTemplates::new(mapping.name.clone(), root, Box::new(PostGis)).unwrap()
    }

    #[test]
    fn test_join_groups_in_pre_order() {
        let templates = templates(&parcels());
        let paths: Vec<&str> = templates.value_templates().iter().map(|t| t.path()).collect();
        assert_eq!(paths, vec!["parcel", "parcel/[id=parcel_id]address"]);

        let names: Vec<&str> = templates.value_templates()[1]
            .sort_fields()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["parcel", "parcel/[id=parcel_id]address"]);
    }

    #[test]
    fn test_meta_query_with_paging() {
        let templates = templates(&parcels());
        let sql = templates.meta_query(&QueryWindow::new(10, 20)).unwrap();
        assert_eq!(
            sql,
            "WITH NR AS (SELECT MIN(SKEY) AS minKey, MAX(SKEY) AS maxKey, count(*) AS numberReturned FROM (SELECT A.id AS SKEY FROM parcel A ORDER BY SKEY LIMIT 10 OFFSET 20) AS IDS), NM AS (SELECT count(*) AS numberMatched FROM (SELECT A.id AS SKEY FROM parcel A ORDER BY 1) AS IDS) SELECT * FROM NR, NM"
        );
    }

    #[test]
    fn test_meta_query_without_number_matched() {
        let templates = templates(&parcels()).with_number_matched(false);
        let sql = templates.meta_query(&QueryWindow::new(5, 0)).unwrap();
        assert!(sql.ends_with("NM AS (SELECT -1::bigint AS numberMatched) SELECT * FROM NR, NM"));
    }

    #[test]
    fn test_meta_query_with_caller_keys() {
        let templates = templates(&named_parcels());
        let keys = vec![SortKey::desc("name")];
        let sql = templates
            .meta_query(&QueryWindow::new(10, 0).with_sort_keys(&keys))
            .unwrap();
        assert!(sql.starts_with(
            "WITH NR AS (SELECT NULL AS minKey, NULL AS maxKey, count(*) AS numberReturned FROM (SELECT A.parcel_name AS CSKEY_0, A.id AS SKEY FROM parcel A ORDER BY CSKEY_0 DESC NULLS LAST, SKEY LIMIT 10) AS IDS)"
        ));
    }

    #[test]
    fn test_caller_keys_place_null_lowest() {
        let templates = templates(&named_parcels());
        let keys = vec![SortKey::asc("name")];
        let window = QueryWindow::new(0, 0).with_sort_keys(&keys);
        assert!(templates
            .meta_query(&window)
            .unwrap()
            .contains("ORDER BY CSKEY_0 NULLS FIRST, SKEY"));
        for sql in templates.value_queries(&window).unwrap() {
            assert!(sql.contains("ORDER BY 1 NULLS FIRST,2"), "{}", sql);
        }

        let root = RelationTreeDeriver::derive_mapping(&named_parcels()).unwrap();
        let sqlite = QueryTemplates::new("parcels", root, Box::new(GeoPackage)).unwrap();
        assert!(sqlite.value_queries(&window).unwrap()[0].ends_with("ORDER BY 1,2"));
    }

    #[test]
    fn test_unknown_sort_property_is_rejected() {
        let templates = templates(&named_parcels());
        let keys = vec![SortKey::asc("name; DROP TABLE parcel")];
        let window = QueryWindow::new(10, 0).with_sort_keys(&keys);
        let err = templates.value_queries(&window).unwrap_err();
        assert!(matches!(
            &err,
            crate::error::Error::Mapping { path, .. } if path == "name; DROP TABLE parcel"
        ));
        assert!(templates.meta_query(&window).is_err());
    }

    #[test]
    fn test_sort_on_nested_property_is_rejected() {
        let templates = templates(&named_parcels());
        let keys = vec![SortKey::asc("city")];
        let err = templates
            .meta_query(&QueryWindow::new(10, 0).with_sort_keys(&keys))
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Mapping { path, .. } if path == "city"));
    }

    #[test]
    fn test_value_queries_with_key_range() {
        let templates = templates(&parcels());
        let (min, max) = (Value::Int(21), Value::Int(30));
        let window = QueryWindow::new(10, 20).with_key_range(&min, &max);
        let queries = templates.value_queries(&window).unwrap();
        assert_eq!(
            queries,
            vec![
                "SELECT A.id AS SKEY, A.id, ST_AsText(ST_ForcePolygonCCW(A.geom)) FROM parcel A WHERE (A.id >= 21 AND A.id <= 30) ORDER BY 1".to_string(),
                "SELECT A.id AS SKEY, B.id AS SKEY_1, B.city FROM parcel A JOIN address B ON (A.id=B.parcel_id) WHERE (A.id >= 21 AND A.id <= 30) ORDER BY 1,2".to_string(),
            ]
        );
    }

    #[test]
    fn test_value_query_with_filter_and_range() {
        let templates = templates(&parcels());
        let (min, max) = (Value::from("a"), Value::from("z"));
        let filter = FilterExpr::eq("city", "Bonn");
        let window = QueryWindow::new(10, 0)
            .with_filter(Some(&filter))
            .with_key_range(&min, &max);
        let queries = templates.value_queries(&window).unwrap();
        assert_eq!(
            queries[0],
            "SELECT A.id AS SKEY, A.id, ST_AsText(ST_ForcePolygonCCW(A.geom)) FROM parcel A WHERE (A.id >= 'a' AND A.id <= 'z') AND (A.id IN (SELECT AA.id FROM parcel AA JOIN address AB ON (AA.id=AB.parcel_id) WHERE AB.city = 'Bonn')) ORDER BY 1"
        );
    }

    #[test]
    fn test_id_lookup_skips_bracket() {
        let templates = templates(&parcels());
        let (min, max) = (Value::Int(1), Value::Int(1));
        let filter = FilterExpr::in_values("id", vec![Value::from("42")]);
        let window = QueryWindow::new(1, 0)
            .with_filter(Some(&filter))
            .with_id_lookup(true)
            .with_key_range(&min, &max);
        let queries = templates.value_queries(&window).unwrap();
        assert_eq!(
            queries[0],
            "SELECT A.id AS SKEY, A.id, ST_AsText(ST_ForcePolygonCCW(A.geom)) FROM parcel A WHERE A.id IN ('42') ORDER BY 1"
        );
    }

    #[test]
    fn test_caller_keys_page_before_joins() {
        let templates = templates(&named_parcels());
        let keys = vec![SortKey::desc("name")];
        let window = QueryWindow::new(10, 20).with_sort_keys(&keys);
        let queries = templates.value_queries(&window).unwrap();
        assert_eq!(
            queries[0],
            "SELECT A.parcel_name AS CSKEY_0, A.id AS SKEY, A.id, ST_AsText(ST_ForcePolygonCCW(A.geom)), A.parcel_name FROM parcel A ORDER BY 1 DESC NULLS LAST,2 LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            queries[1],
            "SELECT A.parcel_name AS CSKEY_0, A.id AS SKEY, B.id AS SKEY_1, B.city FROM parcel A JOIN address B ON (A.id=B.parcel_id) WHERE (A.id IN (SELECT AA.id FROM parcel AA ORDER BY AA.parcel_name DESC NULLS LAST,AA.id LIMIT 10 OFFSET 20)) ORDER BY 1 DESC NULLS LAST,2,3"
        );
    }

    #[test]
    fn test_many_to_many_group() {
        let mapping = FeatureTypeMapping::new("parcels", "parcel").with_property(PropertyMapping::new(
            "tags",
            "[id=parcel_id]parcel_2_tag/[tag_id=id]tag/label",
        ));
        let templates = templates(&mapping);
        let queries = templates.value_queries(&QueryWindow::new(10, 0)).unwrap();
        assert_eq!(
            queries[1],
            "SELECT A.id AS SKEY, C.id AS SKEY_1, C.label FROM parcel A JOIN parcel_2_tag B ON (A.id=B.parcel_id) JOIN tag C ON (B.tag_id=C.id) ORDER BY 1,2"
        );
    }

    #[test]
    fn test_constant_and_temporal_columns() {
        let mapping = FeatureTypeMapping::new("parcels", "parcel")
            .with_property(PropertyMapping::new("kind", "kind").with_constant("parcel"))
            .with_property(PropertyMapping::new("updated", "updated").with_role(PropertyRole::Datetime))
            .with_property(PropertyMapping::new("day", "day").with_role(PropertyRole::Date));
        let root = RelationTreeDeriver::derive_mapping(&mapping).unwrap();
        let templates = QueryTemplates::new("parcels", root, Box::new(GeoPackage)).unwrap();
        let queries = templates.value_queries(&QueryWindow::new(10, 0)).unwrap();
        assert_eq!(
            queries[0],
            "SELECT A.id AS SKEY, 'parcel' AS kind, datetime(A.updated), date(A.day) FROM parcel A ORDER BY 1"
        );
    }

    #[test]
    fn test_non_unique_sort_key() {
        let root = RelationTreeDeriver::derive_paths(&[
            "parcel{sortKey=name}{sortKeyUnique=false}",
            "parcel/name",
        ])
        .unwrap();
        let templates = QueryTemplates::new("parcels", root, Box::new(PostGis)).unwrap();
        let queries = templates.value_queries(&QueryWindow::new(10, 0)).unwrap();
        assert_eq!(
            queries[0],
            "SELECT ROW_NUMBER() OVER (ORDER BY A.name) AS SKEY, A.name FROM parcel A ORDER BY 1"
        );
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let templates = templates(&named_parcels());
        let keys = vec![SortKey::asc("name")];
        let filter = FilterExpr::eq("city", "Bonn");
        let window = QueryWindow::new(10, 5)
            .with_sort_keys(&keys)
            .with_filter(Some(&filter));
        assert_eq!(
            templates.value_queries(&window).unwrap(),
            templates.value_queries(&window).unwrap()
        );
        assert_eq!(
            templates.meta_query(&window).unwrap(),
            templates.meta_query(&window).unwrap()
        );
    }

    #[test]
    fn test_from_mapping_applies_config() {
        let config = ProviderConfig::new().with_number_matched(false);
        let templates = QueryTemplates::from_mapping(&parcels(), &config).unwrap();
        assert_eq!(templates.feature_type(), "parcels");
        assert!(templates
            .meta_query(&QueryWindow::new(10, 0))
            .unwrap()
            .contains("-1::bigint AS numberMatched"));
    }
}
