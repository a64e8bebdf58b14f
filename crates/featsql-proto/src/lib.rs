//! featsql IR types.
//!
//! This crate defines the typed values exchanged between the featsql core
//! and its collaborators: already-parsed filter trees, feature queries, the
//! structural event stream produced on reads, and the value operations an
//! external decoder performs on writes.
//!
//! # Modules
//!
//! - [`value`] - Scalar literal values
//! - [`geometry`] - Geometry literals
//! - [`temporal`] - Temporal literals
//! - [`filter`] - Filter trees
//! - [`query`] - Feature queries and sort keys
//! - [`event`] - Reconstructed feature events
//! - [`mutation`] - Value operations and mutation kinds
//! - [`error`] - IR error types
//!
//! All types derive serde, so filters and queries can be loaded from JSON.

pub mod error;
pub mod event;
pub mod filter;
pub mod geometry;
pub mod mutation;
pub mod query;
pub mod temporal;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use event::FeatureEvent;
pub use filter::{
    ArrayFunction, CompareOp, FilterExpr, Function, Operand, SpatialFunction, TemporalFunction,
};
pub use geometry::{Coordinate, Geometry};
pub use mutation::{MutationKind, ValueOp};
pub use query::{FeatureQuery, SortDirection, SortKey, ID_PROPERTY};
pub use temporal::{IntervalBound, TemporalLiteral, TemporalRange};
pub use value::Value;

/// Parse a filter tree from its JSON encoding.
pub fn filter_from_json(json: &str) -> Result<FilterExpr, Error> {
    Ok(serde_json::from_str(json)?)
}
