//! SQL generation.
//!
//! This module turns relation trees into SQL text:
//! - Deterministic table aliases and JOIN clauses
//! - Filter compilation with membership sub-selects for joined properties
//! - Meta and value query templates per feature type
//! - Dialect hooks for PostGIS and GeoPackage

pub mod alias;
pub mod dialect;
pub mod filter;
pub mod join;
pub mod template;

pub use alias::{alias, table_aliases, AliasGenerator};
pub use dialect::{GeoPackage, PostGis, SqlDialect};
pub use filter::FilterCompiler;
pub use join::{JoinGenerator, JoinOptions, ROW_NUMBER};
pub use template::{
    MetaQueryTemplate, QueryTemplates, QueryWindow, SortField, ValueQueryTemplate, CSKEY, SKEY,
};
