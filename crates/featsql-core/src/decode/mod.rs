//! Feature reads: merging group rows and rebuilding features.
//!
//! The value queries of a feature type each return an ordered [`RowStream`].
//! The [`RowMerger`] interleaves them so the rows of a feature arrive
//! together, and the [`FeatureReconstructor`] turns the merged rows into
//! [`FeatureEvent`](featsql_proto::FeatureEvent)s.

pub mod merge;
pub mod reconstruct;
pub mod row;
pub mod tracker;

pub use merge::{MergeState, RowMerger, SortLayout};
pub use reconstruct::FeatureReconstructor;
pub use row::{row_stream, MergedRow, RowStream, SqlRow, ValueKind};
pub use tracker::MultiplicityTracker;
