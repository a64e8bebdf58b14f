//! SQL dialects.

use crate::config::DialectKind;
use featsql_proto::SpatialFunction;

/// Dialect-specific SQL fragments.
pub trait SqlDialect: Send + Sync {
    /// Dialect name for logs.
    fn name(&self) -> &'static str;

    /// Select a geometry column as WKT.
    fn wkt(&self, column: &str) -> String;

    /// Select a timestamp column as text.
    fn datetime(&self, column: &str) -> String;

    /// Select a date column as text.
    fn date(&self, column: &str) -> String;

    fn datetime_literal(&self, text: &str) -> String;

    fn date_literal(&self, text: &str) -> String;

    /// Text of the earliest representable instant.
    fn instant_min(&self) -> &'static str;

    /// Text of the latest representable instant.
    fn instant_max(&self) -> &'static str;

    /// Cast an expression to text, used for `LIKE`.
    fn string_cast(&self, expr: &str) -> String;

    fn bigint(&self, value: i64) -> String;

    /// Whether `(a,b) OVERLAPS (c,d)` is available for temporal intersection.
    fn supports_overlaps(&self) -> bool {
        false
    }

    fn spatial_function(&self, function: SpatialFunction) -> &'static str {
        match function {
            SpatialFunction::Intersects => "ST_Intersects",
            SpatialFunction::Disjoint => "ST_Disjoint",
            SpatialFunction::Equals => "ST_Equals",
            SpatialFunction::Touches => "ST_Touches",
            SpatialFunction::Within => "ST_Within",
            SpatialFunction::Overlaps => "ST_Overlaps",
            SpatialFunction::Crosses => "ST_Crosses",
            SpatialFunction::Contains => "ST_Contains",
        }
    }

    fn geometry_literal(&self, wkt: &str, srid: u32) -> String {
        format!("ST_GeomFromText('{}',{})", wkt, srid)
    }

    fn limit(&self, limit: usize) -> String {
        format!(" LIMIT {}", limit)
    }

    fn offset(&self, offset: usize) -> String {
        format!(" OFFSET {}", offset)
    }

    fn escape_string(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    /// `ORDER BY` suffix that sorts NULL below every value, so NULL comes
    /// first ascending and last descending. Empty where that is the default.
    fn null_ordering(&self, _descending: bool) -> &'static str {
        ""
    }
}

/// PostgreSQL with PostGIS.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostGis;

impl SqlDialect for PostGis {
    fn name(&self) -> &'static str {
        "postgis"
    }

    fn wkt(&self, column: &str) -> String {
        format!("ST_AsText(ST_ForcePolygonCCW({}))", column)
    }

    fn datetime(&self, column: &str) -> String {
        format!("{}::timestamp(0)", column)
    }

    fn date(&self, column: &str) -> String {
        format!("{}::date", column)
    }

    fn datetime_literal(&self, text: &str) -> String {
        format!("TIMESTAMP '{}'", text)
    }

    fn date_literal(&self, text: &str) -> String {
        format!("DATE '{}'", text)
    }

    fn instant_min(&self) -> &'static str {
        "-infinity"
    }

    fn instant_max(&self) -> &'static str {
        "infinity"
    }

    fn string_cast(&self, expr: &str) -> String {
        format!("{}::varchar", expr)
    }

    fn bigint(&self, value: i64) -> String {
        format!("{}::bigint", value)
    }

    fn supports_overlaps(&self) -> bool {
        true
    }

    fn null_ordering(&self, descending: bool) -> &'static str {
        if descending {
            " NULLS LAST"
        } else {
            " NULLS FIRST"
        }
    }
}

/// GeoPackage through SQLite with SpatiaLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoPackage;

impl SqlDialect for GeoPackage {
    fn name(&self) -> &'static str {
        "geopackage"
    }

    fn wkt(&self, column: &str) -> String {
        format!("ST_AsText({})", column)
    }

    fn datetime(&self, column: &str) -> String {
        format!("datetime({})", column)
    }

    fn date(&self, column: &str) -> String {
        format!("date({})", column)
    }

    fn datetime_literal(&self, text: &str) -> String {
        format!("datetime('{}')", text)
    }

    fn date_literal(&self, text: &str) -> String {
        format!("date('{}')", text)
    }

    fn instant_min(&self) -> &'static str {
        "0001-01-01T00:00:00Z"
    }

    fn instant_max(&self) -> &'static str {
        "9999-12-31T23:59:59Z"
    }

    fn string_cast(&self, expr: &str) -> String {
        format!("cast({} as text)", expr)
    }

    fn bigint(&self, value: i64) -> String {
        format!("CAST({} AS BIGINT)", value)
    }
}

impl DialectKind {
    /// Instantiate the dialect.
    pub fn dialect(&self) -> Box<dyn SqlDialect> {
        match self {
            DialectKind::PostGis => Box::new(PostGis),
            DialectKind::GeoPackage => Box::new(GeoPackage),
        }
    }
}
