//! featsql Core - relational mapping compiler for feature serving.
//!
//! This crate maps feature types onto relational tables: it derives a
//! relation tree from source paths, compiles SQL query templates and filters,
//! compiles nested writes into ordered statements, and rebuilds features from
//! the rows of independently streamed join groups.

pub mod config;
pub mod decode;
pub mod error;
pub mod mapping;
pub mod mutation;
pub mod provider;
pub mod sql;

pub use config::{DialectKind, ProviderConfig};
pub use decode::{FeatureReconstructor, MultiplicityTracker, RowMerger, RowStream, SqlRow, ValueKind};
pub use error::{Error, ExecutionError, ExecutionErrorKind, Result};
pub use mapping::{
    Column, ColumnKind, FeatureTypeMapping, PropertyMapping, PropertyRole, RelationEdge,
    RelationKind, RelationTreeDeriver, SourcePath, TableArena, TableId, TableSchema,
};
pub use mutation::{MutationCompiler, MutationRunner, Statement, ValueContainer};
pub use provider::{FeatureProvider, FeatureStream, SqlClient};
pub use sql::{FilterCompiler, GeoPackage, PostGis, QueryTemplates, QueryWindow, SqlDialect};

/// Re-export protocol types.
pub use featsql_proto as proto;
