//! Feature queries.

use crate::filter::FilterExpr;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Sort direction for a caller-supplied sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// A caller-supplied sort key on a column of the root table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Column of the root table.
    pub field: String,
    /// Sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    /// Create an ascending sort key.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Create a descending sort key.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Check if this key sorts descending.
    pub fn is_descending(&self) -> bool {
        self.direction == SortDirection::Descending
    }
}

/// Placeholder property name that resolves to a feature's identifier.
pub const ID_PROPERTY: &str = "id";

/// A request for features of one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureQuery {
    /// Feature type name.
    pub feature_type: String,
    /// Maximum number of features (0 = unlimited).
    #[serde(default)]
    pub limit: usize,
    /// Number of features to skip.
    #[serde(default)]
    pub offset: usize,
    /// Caller sort keys, applied before the identifier order.
    #[serde(default)]
    pub sort_keys: Vec<SortKey>,
    /// Optional filter.
    #[serde(default)]
    pub filter: Option<FilterExpr>,
    /// Direct identifier lookup.
    #[serde(default)]
    pub id: Option<String>,
}

impl FeatureQuery {
    /// Create a query for all features of a type.
    pub fn new(feature_type: impl Into<String>) -> Self {
        Self {
            feature_type: feature_type.into(),
            limit: 0,
            offset: 0,
            sort_keys: vec![],
            filter: None,
            id: None,
        }
    }

    /// Create a lookup of a single feature by identifier.
    pub fn by_id(feature_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(feature_type)
        }
    }

    /// Set the limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Append a caller sort key.
    pub fn with_sort_key(mut self, key: SortKey) -> Self {
        self.sort_keys.push(key);
        self
    }

    /// Set the filter.
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Whether this query addresses exactly one feature.
    pub fn returns_single_feature(&self) -> bool {
        self.id.is_some()
    }

    /// The filter to compile: an identifier lookup replaces any other filter.
    pub fn effective_filter(&self) -> Option<FilterExpr> {
        match &self.id {
            Some(id) => Some(FilterExpr::in_values(
                ID_PROPERTY,
                vec![Value::String(id.clone())],
            )),
            None => self.filter.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = FeatureQuery::new("parcel")
            .with_limit(10)
            .with_offset(20)
            .with_sort_key(SortKey::desc("name"))
            .with_filter(FilterExpr::eq("name", "x"));

        assert_eq!(query.limit, 10);
        assert_eq!(query.offset, 20);
        assert!(query.sort_keys[0].is_descending());
        assert!(!query.returns_single_feature());
        assert_eq!(query.effective_filter(), Some(FilterExpr::eq("name", "x")));
    }

    #[test]
    fn test_by_id_uses_in_filter() {
        let query = FeatureQuery::by_id("parcel", "42").with_filter(FilterExpr::eq("a", 1));
        assert!(query.returns_single_feature());
        assert_eq!(
            query.effective_filter(),
            Some(FilterExpr::in_values("id", vec![Value::String("42".into())]))
        );
    }

    #[test]
    fn test_query_json_defaults() {
        let query: FeatureQuery = serde_json::from_str(r#"{"feature_type":"parcel"}"#).unwrap();
        assert_eq!(query, FeatureQuery::new("parcel"));
    }
}
