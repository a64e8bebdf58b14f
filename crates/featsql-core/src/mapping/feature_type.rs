//! Declarative feature type mappings.

use serde::{Deserialize, Serialize};

/// What a mapped property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyRole {
    #[default]
    Value,
    /// The feature identifier.
    Id,
    Geometry,
    Datetime,
    Date,
    /// A nested object; its path names a table, not a column.
    Object,
}

/// One property of a feature type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMapping {
    /// Property name as seen by filters and decoders.
    pub name: String,
    /// Source path. Relative paths continue the feature type's root path,
    /// a leading `/` makes them absolute.
    pub source_path: String,
    #[serde(default)]
    pub role: PropertyRole,
    /// Constant value; the column is selected but never stored.
    #[serde(default)]
    pub constant: Option<String>,
}

impl PropertyMapping {
    /// Create a value property.
    pub fn new(name: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            role: PropertyRole::Value,
            constant: None,
        }
    }

    /// Set the role.
    pub fn with_role(mut self, role: PropertyRole) -> Self {
        self.role = role;
        self
    }

    /// Set a constant value.
    pub fn with_constant(mut self, value: impl Into<String>) -> Self {
        self.constant = Some(value.into());
        self
    }
}

/// Mapping of one feature type onto a table tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTypeMapping {
    /// Feature type name.
    pub name: String,
    /// Root table segment, with optional flags.
    pub source_path: String,
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
}

impl FeatureTypeMapping {
    /// Create a mapping rooted at a table.
    pub fn new(name: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            properties: Vec::new(),
        }
    }

    /// Add a property.
    pub fn with_property(mut self, property: PropertyMapping) -> Self {
        self.properties.push(property);
        self
    }

    /// Absolute source path of a property.
    pub fn resolve(&self, property: &PropertyMapping) -> String {
        let path = property.source_path.trim();
        if let Some(absolute) = path.strip_prefix('/') {
            absolute.to_string()
        } else if path.is_empty() {
            self.root_path().to_string()
        } else {
            format!("{}/{}", self.root_path(), path)
        }
    }

    fn root_path(&self) -> &str {
        self.source_path.trim().trim_start_matches('/')
    }
}
