//! Filter compilation.
//!
//! Predicates over root table columns render inline against the root alias.
//! A predicate over a joined table becomes a membership test on the root
//! sort key:
//!
//! ```text
//! A.id IN (SELECT AA.id FROM parcel AA JOIN address AB ON (AA.id=AB.parcel_id) WHERE AB.city = 'Bonn')
//! ```
//!
//! Sub-select aliases live one level below the alias of the enclosing query
//! so filters can be nested inside paging sub-selects.

use super::alias::{alias, table_aliases, AliasGenerator};
use super::dialect::SqlDialect;
use super::join::{JoinGenerator, JoinOptions, ROW_NUMBER};
use crate::config::DEFAULT_NATIVE_SRID;
use crate::error::{Error, Result};
use crate::mapping::TableSchema;
use chrono::SecondsFormat;
use featsql_proto::{
    ArrayFunction, FilterExpr, Function, Geometry, IntervalBound, Operand, TemporalFunction,
    TemporalLiteral, Value, ID_PROPERTY,
};
use tracing::trace;

/// Compiled boolean SQL, kept structured until the enclosing operator is known.
#[derive(Debug, Clone, PartialEq)]
enum Fragment {
    Plain(String),
    /// `<key> [NOT ]IN (<select>)`
    Membership {
        key: String,
        select: String,
        negated: bool,
    },
}

impl Fragment {
    fn into_sql(self) -> String {
        match self {
            Fragment::Plain(sql) => sql,
            Fragment::Membership {
                key,
                select,
                negated,
            } => format!("{} {}IN ({})", key, if negated { "NOT " } else { "" }, select),
        }
    }
}

/// How property names resolve to qualified columns.
enum Scope<'s> {
    /// Feature properties; each entry maps a table path to its alias.
    Feature { tables: Vec<(&'s str, &'s str)> },
    /// Bare column names of a single table.
    Row { alias: &'s str },
}

#[derive(Debug, Clone, Copy)]
enum Context {
    Feature { level: usize },
    Row,
}

/// A temporal operand as a start and an end bound.
struct Range {
    start: String,
    end: String,
    /// The end bound itself is not part of the range.
    exclusive: bool,
}

/// Compiles filter trees for one feature type.
pub struct FilterCompiler<'a> {
    root: &'a TableSchema,
    dialect: &'a dyn SqlDialect,
    srid: u32,
    collation: Option<&'a str>,
}

impl<'a> FilterCompiler<'a> {
    /// Create a compiler for the tree rooted at `root`.
    pub fn new(root: &'a TableSchema, dialect: &'a dyn SqlDialect) -> Self {
        Self {
            root,
            dialect,
            srid: DEFAULT_NATIVE_SRID,
            collation: None,
        }
    }

    /// Set the SRID of geometry literals.
    pub fn with_srid(mut self, srid: u32) -> Self {
        self.srid = srid;
        self
    }

    /// Set the collation used by `ACCENTI()`.
    pub fn with_collation(mut self, collation: Option<&'a str>) -> Self {
        self.collation = collation;
        self
    }

    pub fn dialect(&self) -> &'a dyn SqlDialect {
        self.dialect
    }

    /// Compile a feature filter for a query whose root alias is `A`.
    pub fn compile(&self, filter: &FilterExpr) -> Result<String> {
        self.compile_at(filter, 0)
    }

    /// Compile a feature filter for a query whose root alias sits at `level`.
    pub fn compile_at(&self, filter: &FilterExpr, level: usize) -> Result<String> {
        let sql = self
            .fragment(filter, Context::Feature { level }, &Scope::Row { alias: "" })?
            .into_sql();
        trace!(level, sql = %sql, "compiled filter");
        Ok(sql)
    }

    /// Compile a row filter whose properties are columns of the table aliased `alias`.
    pub fn compile_row_filter(&self, filter: &FilterExpr, alias: &str) -> Result<String> {
        Ok(self
            .fragment(filter, Context::Row, &Scope::Row { alias })?
            .into_sql())
    }

    /// The root row filter and the caller's filter, combined.
    pub fn where_filter(&self, filter: Option<&FilterExpr>, level: usize) -> Result<Option<String>> {
        let root_alias = alias(level, 0);
        let row = self
            .root
            .filter
            .as_ref()
            .map(|f| self.compile_row_filter(f, &root_alias))
            .transpose()?;
        let user = filter.map(|f| self.compile_at(f, level)).transpose()?;

        Ok(match (row, user) {
            (Some(row), Some(user)) => Some(format!("{} AND {}", row, user)),
            (row, user) => row.or(user),
        })
    }

    fn fragment(&self, expr: &FilterExpr, context: Context, scope: &Scope<'_>) -> Result<Fragment> {
        match expr {
            FilterExpr::And { args } => self.combine(args, " AND ", "1=1", context, scope),
            FilterExpr::Or { args } => self.combine(args, " OR ", "1=0", context, scope),
            FilterExpr::Not { arg } => {
                if let FilterExpr::In { .. } = arg.as_ref() {
                    return self.predicate(arg, context, scope, true);
                }
                Ok(match self.fragment(arg, context, scope)? {
                    Fragment::Membership {
                        key,
                        select,
                        negated,
                    } => Fragment::Membership {
                        key,
                        select,
                        negated: !negated,
                    },
                    Fragment::Plain(sql) => Fragment::Plain(format!("NOT ({})", sql)),
                })
            }
            FilterExpr::Bool { value } => Ok(Fragment::Plain(boolean(*value))),
            FilterExpr::Array {
                function,
                left,
                right,
            } => self.array(*function, left, right, context),
            _ => self.predicate(expr, context, scope, false),
        }
    }

    fn combine(
        &self,
        args: &[FilterExpr],
        separator: &str,
        empty: &str,
        context: Context,
        scope: &Scope<'_>,
    ) -> Result<Fragment> {
        match args {
            [] => Ok(Fragment::Plain(empty.to_string())),
            [only] => self.fragment(only, context, scope),
            _ => {
                let parts = args
                    .iter()
                    .map(|a| self.fragment(a, context, scope).map(Fragment::into_sql))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Fragment::Plain(format!("({})", parts.join(separator))))
            }
        }
    }

    fn predicate(
        &self,
        expr: &FilterExpr,
        context: Context,
        scope: &Scope<'_>,
        negated: bool,
    ) -> Result<Fragment> {
        let level = match context {
            Context::Row => return Ok(Fragment::Plain(self.render(expr, scope, negated)?)),
            Context::Feature { level } => level,
        };

        match self.joined_table(&expr.properties())? {
            None => {
                let root_alias = alias(level, 0);
                let scope = Scope::Feature {
                    tables: vec![(self.root.path.as_str(), root_alias.as_str())],
                };
                Ok(Fragment::Plain(self.render(expr, &scope, negated)?))
            }
            Some(table) => self.membership(table, level, |scope, _| self.render(expr, scope, negated)),
        }
    }

    /// The one non-root table a predicate refers to, if any.
    fn joined_table(&self, properties: &[&str]) -> Result<Option<&'a TableSchema>> {
        let mut joined: Option<&'a TableSchema> = None;
        for property in properties {
            let (table, _) = self.resolve(property)?;
            if table.is_root() {
                continue;
            }
            match joined {
                Some(previous) if previous.path != table.path => {
                    return Err(Error::mapping(
                        *property,
                        format!(
                            "predicate combines properties of '{}' and '{}'",
                            previous.name, table.name
                        ),
                    ));
                }
                _ => joined = Some(table),
            }
        }
        Ok(joined)
    }

    /// Wrap a condition on `table` into a membership test on the root sort key.
    fn membership<F>(&self, table: &'a TableSchema, level: usize, condition: F) -> Result<Fragment>
    where
        F: FnOnce(&Scope<'_>, &str) -> Result<String>,
    {
        let aliases = AliasGenerator::chain(&table.relation_path, level + 1);
        let joins = JoinGenerator::new(self).joins(
            &table.relation_path,
            &aliases,
            JoinOptions::default(),
        )?;
        let chain = table_aliases(&table.relation_path, &aliases);
        let inner_root = aliases[0].as_str();
        let leaf = chain.last().copied().unwrap_or(inner_root);

        let scope = Scope::Feature {
            tables: vec![(self.root.path.as_str(), inner_root), (table.path.as_str(), leaf)],
        };
        let condition = condition(&scope, inner_root)?;
        let joins = if joins.is_empty() {
            String::new()
        } else {
            format!("{} ", joins.join(" "))
        };

        Ok(Fragment::Membership {
            key: format!("{}.{}", alias(level, 0), self.root.sort_key),
            select: format!(
                "SELECT {a}.{sk} FROM {table} {a} {joins}WHERE {condition}",
                a = inner_root,
                sk = self.root.sort_key,
                table = self.root.name,
                joins = joins,
                condition = condition,
            ),
            negated: false,
        })
    }

    fn render(&self, expr: &FilterExpr, scope: &Scope<'_>, negated: bool) -> Result<String> {
        match expr {
            FilterExpr::Compare { cmp, left, right } => Ok(format!(
                "{} {} {}",
                self.operand(left, scope)?,
                cmp.as_sql(),
                self.operand(right, scope)?
            )),
            FilterExpr::Like { value, pattern } => Ok(format!(
                "{} LIKE {}",
                self.dialect.string_cast(&self.operand(value, scope)?),
                self.operand(pattern, scope)?
            )),
            FilterExpr::In { value, list } => {
                let list = list
                    .iter()
                    .map(|o| self.operand(o, scope))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!(
                    "{} {}IN ({})",
                    self.operand(value, scope)?,
                    if negated { "NOT " } else { "" },
                    list.join(", ")
                ))
            }
            FilterExpr::IsNull { value } => Ok(format!("{} IS NULL", self.operand(value, scope)?)),
            FilterExpr::Between {
                value,
                lower,
                upper,
            } => Ok(format!(
                "{} BETWEEN {} AND {}",
                self.operand(value, scope)?,
                self.operand(lower, scope)?,
                self.operand(upper, scope)?
            )),
            FilterExpr::Spatial {
                function,
                left,
                right,
            } => Ok(format!(
                "{}({}, {})",
                self.dialect.spatial_function(*function),
                self.operand(left, scope)?,
                self.operand(right, scope)?
            )),
            FilterExpr::Temporal {
                function,
                left,
                right,
            } => self.temporal(*function, left, right, scope),
            FilterExpr::And { .. }
            | FilterExpr::Or { .. }
            | FilterExpr::Not { .. }
            | FilterExpr::Bool { .. }
            | FilterExpr::Array { .. } => Ok(self.fragment(expr, Context::Row, scope)?.into_sql()),
        }
    }

    fn operand(&self, operand: &Operand, scope: &Scope<'_>) -> Result<String> {
        match operand {
            Operand::Property(name) => self.column(name, scope),
            Operand::Literal(value) => Ok(self.literal(value)),
            Operand::Geometry(geometry) => Ok(self.geometry(geometry)),
            Operand::Temporal(TemporalLiteral::Instant(t)) => Ok(self
                .dialect
                .datetime_literal(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
            Operand::Temporal(TemporalLiteral::Date(d)) => {
                Ok(self.dialect.date_literal(&d.format("%Y-%m-%d").to_string()))
            }
            Operand::Temporal(_) | Operand::Interval { .. } => {
                let range = self.range(operand, scope)?;
                Ok(format!("({},{})", range.start, range.end))
            }
            Operand::Array(values) => {
                let values: Vec<String> = values.iter().map(|v| self.literal(v)).collect();
                Ok(format!("({})", values.join(", ")))
            }
            Operand::Function { function, args } => self.function(*function, args, scope),
        }
    }

    fn function(&self, function: Function, args: &[Operand], scope: &Scope<'_>) -> Result<String> {
        if function == Function::Position {
            return match scope {
                Scope::Row { alias } => Ok(format!("{}.{}", alias, ROW_NUMBER)),
                Scope::Feature { .. } => Err(Error::mapping(
                    "POSITION()",
                    "only allowed in relation filters",
                )),
            };
        }

        let arg = args.first().ok_or_else(|| {
            Error::mapping(format!("{:?}", function).to_uppercase(), "missing argument")
        })?;
        match function {
            Function::Upper => Ok(format!("UPPER({})", self.operand(arg, scope)?)),
            Function::Lower => Ok(format!("LOWER({})", self.operand(arg, scope)?)),
            Function::Casei => match arg {
                Operand::Literal(Value::String(s)) => {
                    Ok(self.literal(&Value::String(s.to_lowercase())))
                }
                _ => Ok(format!("LOWER({})", self.operand(arg, scope)?)),
            },
            Function::Accenti => {
                let collation = self.collation.ok_or_else(|| {
                    Error::mapping("ACCENTI()", "no accent-insensitive collation configured")
                })?;
                Ok(format!("{} COLLATE \"{}\"", self.operand(arg, scope)?, collation))
            }
            Function::Position => Err(Error::mapping("POSITION()", "unexpected argument")),
        }
    }

    fn column(&self, property: &str, scope: &Scope<'_>) -> Result<String> {
        match scope {
            Scope::Row { alias } => Ok(format!("{}.{}", alias, property)),
            Scope::Feature { tables } => {
                let (table, column) = self.resolve(property)?;
                let alias = tables
                    .iter()
                    .find(|(path, _)| *path == table.path)
                    .map(|(_, alias)| *alias)
                    .ok_or_else(|| {
                        Error::mapping(property, "property is not reachable from this predicate")
                    })?;
                Ok(format!("{}.{}", alias, column))
            }
        }
    }

    /// Table and column a property is read from.
    /// Root column ordered by the caller sort key on `property`.
    pub fn sort_column(&self, property: &str) -> Result<&'a str> {
        let (table, column) = self.resolve(property)?;
        if table.is_root() {
            Ok(column)
        } else {
            Err(Error::mapping(property, "sort key is not a column of the root table"))
        }
    }

    fn resolve(&self, property: &str) -> Result<(&'a TableSchema, &'a str)> {
        let root: &'a TableSchema = self.root;
        if let Some((table, column)) = root.property(property) {
            return Ok((table, column.name.as_str()));
        }
        if property == ID_PROPERTY {
            let column = root
                .identifier()
                .map(|c| c.name.as_str())
                .unwrap_or(root.primary_key.as_str());
            return Ok((root, column));
        }
        if let Some(column) = root.column(property) {
            return Ok((root, column.name.as_str()));
        }
        Err(Error::mapping(property, "unknown property"))
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => format!("'{}'", self.dialect.escape_string(s)),
        }
    }

    fn geometry(&self, geometry: &Geometry) -> String {
        let wkt = match geometry {
            // crosses the antimeridian
            Geometry::Envelope {
                min_x,
                min_y,
                max_x,
                max_y,
            } if min_x > max_x => Geometry::MultiPolygon(vec![
                vec![Geometry::rectangle(*min_x, *min_y, 180.0, *max_y)],
                vec![Geometry::rectangle(-180.0, *min_y, *max_x, *max_y)],
            ])
            .to_wkt(),
            other => other.to_wkt(),
        };
        self.dialect.geometry_literal(&wkt, self.srid)
    }

    fn bound(&self, bound: &IntervalBound, start: bool) -> String {
        match bound {
            IntervalBound::Open => self.dialect.datetime_literal(if start {
                self.dialect.instant_min()
            } else {
                self.dialect.instant_max()
            }),
            IntervalBound::Instant(t) => self
                .dialect
                .datetime_literal(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            IntervalBound::Date(d) => self.dialect.date_literal(&d.format("%Y-%m-%d").to_string()),
        }
    }

    fn range(&self, operand: &Operand, scope: &Scope<'_>) -> Result<Range> {
        match operand {
            Operand::Temporal(literal) => {
                let range = literal.range();
                Ok(Range {
                    start: self.bound(&range.start, true),
                    end: self.bound(&range.end_exclusive, false),
                    exclusive: true,
                })
            }
            Operand::Interval { start, end } => {
                let start = self.range(start, scope)?;
                let end = self.range(end, scope)?;
                Ok(Range {
                    start: start.start,
                    end: end.end,
                    exclusive: end.exclusive,
                })
            }
            Operand::Property(_) | Operand::Function { .. } => {
                let column = self.operand(operand, scope)?;
                Ok(Range {
                    start: column.clone(),
                    end: column,
                    exclusive: false,
                })
            }
            Operand::Literal(_) | Operand::Geometry(_) | Operand::Array(_) => Err(Error::mapping(
                format!("{:?}", operand),
                "not a temporal operand",
            )),
        }
    }

    fn temporal(
        &self,
        function: TemporalFunction,
        left: &Operand,
        right: &Operand,
        scope: &Scope<'_>,
    ) -> Result<String> {
        let l = self.range(left, scope)?;
        let r = self.range(right, scope)?;

        Ok(match function {
            TemporalFunction::Intersects if self.dialect.supports_overlaps() => format!(
                "({}, {}) OVERLAPS ({}, {})",
                l.start, l.end, r.start, r.end
            ),
            TemporalFunction::Intersects => intersects(&l, &r),
            TemporalFunction::Disjoint => format!("NOT ({})", intersects(&l, &r)),
            TemporalFunction::Before => ends_before(&l, &r.start),
            TemporalFunction::After => ends_before(&r, &l.start),
            TemporalFunction::During => format!(
                "{} >= {} AND {}",
                l.start,
                r.start,
                if l.exclusive {
                    format!("{} <= {}", l.end, r.end)
                } else {
                    at_or_before_end(&l.end, &r)
                }
            ),
            TemporalFunction::Equals => format!(
                "{} = {} AND {} {} {}",
                l.start,
                r.start,
                l.end,
                if l.exclusive == r.exclusive { "=" } else { "<" },
                r.end
            ),
        })
    }

    fn array(
        &self,
        function: ArrayFunction,
        left: &Operand,
        right: &Operand,
        context: Context,
    ) -> Result<Fragment> {
        if let (Some(a), Some(b)) = (literal_values(left), literal_values(right)) {
            let holds = match function {
                ArrayFunction::Contains => b.iter().all(|v| a.contains(v)),
                ArrayFunction::ContainedBy => a.iter().all(|v| b.contains(v)),
                ArrayFunction::Equals => a.len() == b.len() && b.iter().all(|v| a.contains(v)),
                ArrayFunction::Overlaps => a.iter().any(|v| b.contains(v)),
            };
            return Ok(Fragment::Plain(boolean(holds)));
        }

        let (property, values, function) = match (left, right) {
            (Operand::Array(values), property) => (property, values, mirror(function)),
            (property, Operand::Array(values)) => (property, values, function),
            _ => {
                return Err(Error::mapping(
                    format!("{:?}", left),
                    "array predicates need a literal array operand",
                ))
            }
        };
        let name = operand_name(property);

        let level = match context {
            Context::Feature { level } => level,
            Context::Row => {
                return Err(Error::mapping(name, "array predicates are not allowed in row filters"))
            }
        };
        if !matches!(function, ArrayFunction::Overlaps | ArrayFunction::Contains) {
            return Err(Error::mapping(
                name,
                format!("array operator {:?} is not supported on properties", function),
            ));
        }

        let table = self.joined_table(&[name.as_str()])?.unwrap_or(self.root);
        let list: Vec<String> = values.iter().map(|v| self.literal(v)).collect();
        let count = list.len();
        let sort_key = &self.root.sort_key;

        self.membership(table, level, |scope, inner_root| {
            let column = self.operand(property, scope)?;
            let group = format!(" GROUP BY {}.{}", inner_root, sort_key);
            Ok(match function {
                ArrayFunction::Contains => format!(
                    "{} IN ({}){} HAVING count(distinct {}) = {}",
                    column,
                    list.join(", "),
                    group,
                    column,
                    count
                ),
                _ => format!("{} IN ({}){}", column, list.join(", "), group),
            })
        })
    }
}

fn boolean(value: bool) -> String {
    if value { "1=1" } else { "1=0" }.to_string()
}

fn literal_values(operand: &Operand) -> Option<Vec<Value>> {
    match operand {
        Operand::Array(values) => Some(values.clone()),
        Operand::Literal(value) => Some(vec![value.clone()]),
        _ => None,
    }
}

fn operand_name(operand: &Operand) -> String {
    match operand {
        Operand::Property(name) => name.clone(),
        Operand::Function { args, .. } => args.first().map(operand_name).unwrap_or_default(),
        other => format!("{:?}", other),
    }
}

/// Array operator with its operands swapped.
fn mirror(function: ArrayFunction) -> ArrayFunction {
    match function {
        ArrayFunction::Contains => ArrayFunction::ContainedBy,
        ArrayFunction::ContainedBy => ArrayFunction::Contains,
        other => other,
    }
}

/// `point` lies at or before the last instant of `range`.
fn at_or_before_end(point: &str, range: &Range) -> String {
    format!(
        "{} {} {}",
        point,
        if range.exclusive { "<" } else { "<=" },
        range.end
    )
}

/// `range` ends before `point`.
fn ends_before(range: &Range, point: &str) -> String {
    format!(
        "{} {} {}",
        range.end,
        if range.exclusive { "<=" } else { "<" },
        point
    )
}

fn intersects(l: &Range, r: &Range) -> String {
    format!(
        "{} AND {}",
        at_or_before_end(&r.start, l),
        at_or_before_end(&l.start, r)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FeatureTypeMapping, PropertyMapping, PropertyRole, RelationTreeDeriver};
    use crate::sql::dialect::{GeoPackage, PostGis};
    use featsql_proto::{CompareOp, SpatialFunction};
    use pretty_assertions::assert_eq;

    fn schema() -> TableSchema {
        let mapping = FeatureTypeMapping::new("parcels", "parcel")
            .with_property(PropertyMapping::new("id", "id").with_role(PropertyRole::Id))
            .with_property(PropertyMapping::new("name", "name"))
            .with_property(PropertyMapping::new("geometry", "geom").with_role(PropertyRole::Geometry))
            .with_property(PropertyMapping::new("updated", "updated").with_role(PropertyRole::Datetime))
            .with_property(PropertyMapping::new("city", "[id=parcel_id]address/city"))
            .with_property(PropertyMapping::new("zip", "[id=parcel_id]address/zip"))
            .with_property(PropertyMapping::new(
                "tags",
                "[id=parcel_id]parcel_2_tag/[tag_id=id]tag/label",
            ));
        RelationTreeDeriver::derive_mapping(&mapping).unwrap()
    }

    fn compile(filter: &FilterExpr) -> String {
        let schema = schema();
        FilterCompiler::new(&schema, &PostGis).compile(filter).unwrap()
    }

    #[test]
    fn test_root_comparison() {
        assert_eq!(compile(&FilterExpr::eq("name", "x")), "A.name = 'x'");
        assert_eq!(compile(&FilterExpr::gt("id", 5)), "A.id > 5");
    }

    #[test]
    fn test_and_or() {
        let filter = FilterExpr::or(vec![
            FilterExpr::eq("name", "a"),
            FilterExpr::and(vec![FilterExpr::is_null("name"), FilterExpr::lt("id", 3)]),
        ]);
        assert_eq!(
            compile(&filter),
            "(A.name = 'a' OR (A.name IS NULL AND A.id < 3))"
        );
    }

    #[test]
    fn test_joined_property_becomes_membership() {
        assert_eq!(
            compile(&FilterExpr::eq("city", "Bonn")),
            "A.id IN (SELECT AA.id FROM parcel AA JOIN address AB ON (AA.id=AB.parcel_id) WHERE AB.city = 'Bonn')"
        );
    }

    #[test]
    fn test_many_to_many_membership() {
        assert_eq!(
            compile(&FilterExpr::eq("tags", "red")),
            "A.id IN (SELECT AA.id FROM parcel AA JOIN parcel_2_tag AB ON (AA.id=AB.parcel_id) JOIN tag AC ON (AB.tag_id=AC.id) WHERE AC.label = 'red')"
        );
    }

    #[test]
    fn test_not_flips_membership() {
        assert_eq!(
            compile(&FilterExpr::not(FilterExpr::eq("city", "Bonn"))),
            "A.id NOT IN (SELECT AA.id FROM parcel AA JOIN address AB ON (AA.id=AB.parcel_id) WHERE AB.city = 'Bonn')"
        );
    }

    #[test]
    fn test_not_in_list_and_plain_not() {
        assert_eq!(
            compile(&FilterExpr::not(FilterExpr::in_values(
                "name",
                vec!["a".into(), "b".into()]
            ))),
            "A.name NOT IN ('a', 'b')"
        );
        assert_eq!(
            compile(&FilterExpr::not(FilterExpr::eq("name", "a"))),
            "NOT (A.name = 'a')"
        );
    }

    #[test]
    fn test_nested_level_aliases() {
        let schema = schema();
        let sql = FilterCompiler::new(&schema, &PostGis)
            .compile_at(&FilterExpr::eq("zip", "53111"), 1)
            .unwrap();
        assert_eq!(
            sql,
            "AA.id IN (SELECT AAA.id FROM parcel AAA JOIN address AAB ON (AAA.id=AAB.parcel_id) WHERE AAB.zip = '53111')"
        );
    }

    #[test]
    fn test_predicate_across_tables_fails() {
        let schema = schema();
        let filter = FilterExpr::Compare {
            cmp: CompareOp::Eq,
            left: Operand::property("city"),
            right: Operand::property("tags"),
        };
        let err = FilterCompiler::new(&schema, &PostGis).compile(&filter).unwrap_err();
        assert!(matches!(err, Error::Mapping { .. }));
    }

    #[test]
    fn test_unknown_property_named() {
        let schema = schema();
        let err = FilterCompiler::new(&schema, &PostGis)
            .compile(&FilterExpr::eq("colour", "red"))
            .unwrap_err();
        assert_eq!(err.to_string(), "mapping error for 'colour': unknown property");
    }

    #[test]
    fn test_literal_arrays_short_circuit() {
        let a = Operand::Array(vec!["a".into(), "b".into()]);
        let b = Operand::Array(vec!["b".into()]);
        let c = Operand::Array(vec!["c".into()]);
        assert_eq!(
            compile(&FilterExpr::array(ArrayFunction::Contains, a.clone(), b.clone())),
            "1=1"
        );
        assert_eq!(
            compile(&FilterExpr::array(ArrayFunction::ContainedBy, a.clone(), b.clone())),
            "1=0"
        );
        assert_eq!(
            compile(&FilterExpr::array(ArrayFunction::Overlaps, a.clone(), c)),
            "1=0"
        );
        assert_eq!(
            compile(&FilterExpr::array(ArrayFunction::Equals, a.clone(), a)),
            "1=1"
        );
    }

    #[test]
    fn test_array_contains_property() {
        let filter = FilterExpr::array(
            ArrayFunction::Contains,
            Operand::property("tags"),
            Operand::Array(vec!["red".into(), "blue".into()]),
        );
        assert_eq!(
            compile(&filter),
            "A.id IN (SELECT AA.id FROM parcel AA JOIN parcel_2_tag AB ON (AA.id=AB.parcel_id) JOIN tag AC ON (AB.tag_id=AC.id) WHERE AC.label IN ('red', 'blue') GROUP BY AA.id HAVING count(distinct AC.label) = 2)"
        );
    }

    #[test]
    fn test_array_overlaps_property() {
        let filter = FilterExpr::array(
            ArrayFunction::Overlaps,
            Operand::Array(vec!["red".into()]),
            Operand::property("tags"),
        );
        assert_eq!(
            compile(&filter),
            "A.id IN (SELECT AA.id FROM parcel AA JOIN parcel_2_tag AB ON (AA.id=AB.parcel_id) JOIN tag AC ON (AB.tag_id=AC.id) WHERE AC.label IN ('red') GROUP BY AA.id)"
        );
    }

    #[test]
    fn test_array_equals_property_unsupported() {
        let schema = schema();
        let filter = FilterExpr::array(
            ArrayFunction::Equals,
            Operand::property("tags"),
            Operand::Array(vec!["red".into()]),
        );
        let err = FilterCompiler::new(&schema, &PostGis).compile(&filter).unwrap_err();
        assert!(err.to_string().contains("tags"));
    }

    #[test]
    fn test_spatial_and_antimeridian() {
        assert_eq!(
            compile(&FilterExpr::spatial(
                SpatialFunction::Intersects,
                "geometry",
                Geometry::envelope(0.0, 1.0, 2.0, 3.0)
            )),
            "ST_Intersects(A.geom, ST_GeomFromText('POLYGON((0 1,2 1,2 3,0 3,0 1))',4326))"
        );
        assert_eq!(
            compile(&FilterExpr::spatial(
                SpatialFunction::Within,
                "geometry",
                Geometry::envelope(170.0, -10.0, -170.0, 10.0)
            )),
            "ST_Within(A.geom, ST_GeomFromText('MULTIPOLYGON(((170 -10,180 -10,180 10,170 10,170 -10)),((-180 -10,-170 -10,-170 10,-180 10,-180 -10)))',4326))"
        );
    }

    #[test]
    fn test_srid_override() {
        let schema = schema();
        let sql = FilterCompiler::new(&schema, &PostGis)
            .with_srid(25832)
            .compile(&FilterExpr::spatial(
                SpatialFunction::Intersects,
                "geometry",
                Geometry::Point(featsql_proto::Coordinate(1.0, 2.0)),
            ))
            .unwrap();
        assert_eq!(sql, "ST_Intersects(A.geom, ST_GeomFromText('POINT(1 2)',25832))");
    }

    #[test]
    fn test_temporal_overlaps_postgis() {
        let filter = FilterExpr::temporal(
            TemporalFunction::Intersects,
            "updated",
            TemporalLiteral::instant("2020-01-01T00:00:00Z").unwrap(),
        );
        assert_eq!(
            compile(&filter),
            "(A.updated, A.updated) OVERLAPS (TIMESTAMP '2020-01-01T00:00:00Z', TIMESTAMP '2020-01-01T00:00:01Z')"
        );
    }

    #[test]
    fn test_temporal_literal_keeps_fractional_seconds() {
        let filter = FilterExpr::temporal(
            TemporalFunction::Intersects,
            "updated",
            TemporalLiteral::instant("2020-01-01T00:00:00.5Z").unwrap(),
        );
        assert_eq!(
            compile(&filter),
            "(A.updated, A.updated) OVERLAPS (TIMESTAMP '2020-01-01T00:00:00.500Z', TIMESTAMP '2020-01-01T00:00:01.500Z')"
        );
    }

    #[test]
    fn test_temporal_open_interval_uses_infinity() {
        let filter = FilterExpr::temporal(
            TemporalFunction::Intersects,
            "updated",
            TemporalLiteral::Interval(
                IntervalBound::Open,
                IntervalBound::Date(chrono::NaiveDate::from_ymd_opt(2020, 1, 31).unwrap()),
            ),
        );
        assert_eq!(
            compile(&filter),
            "(A.updated, A.updated) OVERLAPS (TIMESTAMP '-infinity', DATE '2020-02-01')"
        );
    }

    #[test]
    fn test_temporal_comparison_rewriting() {
        let schema = schema();
        let compiler = FilterCompiler::new(&schema, &GeoPackage);
        let instant = TemporalLiteral::instant("2020-01-01T00:00:00Z").unwrap();

        let sql = compiler
            .compile(&FilterExpr::temporal(
                TemporalFunction::Intersects,
                "updated",
                instant.clone(),
            ))
            .unwrap();
        assert_eq!(
            sql,
            "datetime('2020-01-01T00:00:00Z') <= A.updated AND A.updated < datetime('2020-01-01T00:00:01Z')"
        );

        let sql = compiler
            .compile(&FilterExpr::temporal(
                TemporalFunction::Before,
                "updated",
                instant.clone(),
            ))
            .unwrap();
        assert_eq!(sql, "A.updated < datetime('2020-01-01T00:00:00Z')");

        let sql = compiler
            .compile(&FilterExpr::temporal(TemporalFunction::After, "updated", instant))
            .unwrap();
        assert_eq!(sql, "datetime('2020-01-01T00:00:01Z') <= A.updated");
    }

    #[test]
    fn test_functions() {
        let schema = schema();
        let filter = FilterExpr::Compare {
            cmp: CompareOp::Eq,
            left: Operand::function(Function::Casei, vec![Operand::property("name")]),
            right: Operand::function(Function::Casei, vec![Operand::literal("ABC")]),
        };
        let compiler = FilterCompiler::new(&schema, &PostGis);
        assert_eq!(compiler.compile(&filter).unwrap(), "LOWER(A.name) = 'abc'");

        let accenti = FilterExpr::Compare {
            cmp: CompareOp::Eq,
            left: Operand::function(Function::Accenti, vec![Operand::property("name")]),
            right: Operand::literal("e"),
        };
        assert!(compiler.compile(&accenti).is_err());
        let compiler = compiler.with_collation(Some("und-x-icu"));
        assert_eq!(
            compiler.compile(&accenti).unwrap(),
            "A.name COLLATE \"und-x-icu\" = 'e'"
        );
    }

    #[test]
    fn test_like_uses_string_cast() {
        assert_eq!(
            compile(&FilterExpr::like("name", "Ab%")),
            "A.name::varchar LIKE 'Ab%'"
        );
    }

    #[test]
    fn test_position_only_in_row_filters() {
        let schema = schema();
        let compiler = FilterCompiler::new(&schema, &PostGis);
        let filter = FilterExpr::Compare {
            cmp: CompareOp::Le,
            left: Operand::position(),
            right: Operand::literal(1),
        };
        assert!(compiler.compile(&filter).is_err());
        assert_eq!(
            compiler.compile_row_filter(&filter, "C").unwrap(),
            "C.row_number <= 1"
        );
    }

    #[test]
    fn test_where_filter_combines_root_row_filter() {
        let schema = RelationTreeDeriver::derive_paths(&[
            r#"parcel{filter={"op":"compare","cmp":"eq","left":{"property":"active"},"right":{"literal":true}}}"#,
            "parcel/name",
        ])
        .unwrap();
        let compiler = FilterCompiler::new(&schema, &PostGis);
        assert_eq!(
            compiler.where_filter(None, 0).unwrap().as_deref(),
            Some("A.active = TRUE")
        );
        assert_eq!(
            compiler
                .where_filter(Some(&FilterExpr::eq("name", "x")), 0)
                .unwrap()
                .as_deref(),
            Some("A.active = TRUE AND A.name = 'x'")
        );
    }

    #[test]
    fn test_escape_string_literal() {
        assert_eq!(compile(&FilterExpr::eq("name", "O'Brien")), "A.name = 'O''Brien'");
    }
}
