//! Provider configuration.

use crate::error::{Error, Result};
use crate::mapping::FeatureTypeMapping;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default page size when a query has no limit.
pub const DEFAULT_LIMIT: usize = 10;

/// Upper bound for any requested limit.
pub const DEFAULT_MAX_LIMIT: usize = 10_000;

/// Spatial reference id of stored geometries.
pub const DEFAULT_NATIVE_SRID: u32 = 4326;

/// SQL flavor of the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    PostGis,
    GeoPackage,
}

/// Configuration of a feature provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub dialect: DialectKind,

    /// Run the count over the whole filtered table. Expensive on large tables.
    pub compute_number_matched: bool,

    pub default_limit: usize,

    pub max_limit: usize,

    pub native_srid: u32,

    /// Collation applied by `ACCENTI()`. Filters using it fail when unset.
    pub accenti_collation: Option<String>,

    /// Mapped feature types.
    pub types: Vec<FeatureTypeMapping>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::PostGis,
            compute_number_matched: true,
            default_limit: DEFAULT_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            native_srid: DEFAULT_NATIVE_SRID,
            accenti_collation: None,
            types: Vec::new(),
        }
    }
}

impl ProviderConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dialect.
    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    /// Enable or disable the total count.
    pub fn with_number_matched(mut self, enabled: bool) -> Self {
        self.compute_number_matched = enabled;
        self
    }

    /// Set the default limit.
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Set the maximum limit.
    pub fn with_max_limit(mut self, limit: usize) -> Self {
        self.max_limit = limit;
        self
    }

    /// Set the native SRID.
    pub fn with_native_srid(mut self, srid: u32) -> Self {
        self.native_srid = srid;
        self
    }

    /// Set the accent-insensitive collation.
    pub fn with_accenti_collation(mut self, collation: impl Into<String>) -> Self {
        self.accenti_collation = Some(collation.into());
        self
    }

    /// Add a feature type.
    pub fn with_type(mut self, mapping: FeatureTypeMapping) -> Self {
        self.types.push(mapping);
        self
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check limits and feature type names.
    pub fn validate(&self) -> Result<()> {
        if self.max_limit == 0 {
            return Err(Error::Config("max_limit must be positive".into()));
        }
        if self.default_limit > self.max_limit {
            return Err(Error::Config(format!(
                "default_limit {} exceeds max_limit {}",
                self.default_limit, self.max_limit
            )));
        }

        let mut names = HashSet::new();
        for mapping in &self.types {
            if mapping.source_path.trim().is_empty() {
                return Err(Error::Config(format!(
                    "feature type '{}' has no source path",
                    mapping.name
                )));
            }
            if !names.insert(mapping.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate feature type '{}'",
                    mapping.name
                )));
            }
        }
        Ok(())
    }

    /// Get a feature type by name.
    pub fn feature_type(&self, name: &str) -> Option<&FeatureTypeMapping> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Clamp a requested limit; zero selects the default.
    pub fn effective_limit(&self, requested: usize) -> usize {
        match requested {
            0 => self.default_limit,
            n => n.min(self.max_limit),
        }
    }
}
