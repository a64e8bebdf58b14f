//! Source path mapping: parsing and relation tree derivation.

pub mod arena;
pub mod deriver;
pub mod feature_type;
pub mod path;
pub mod relation;
pub mod schema;

pub use arena::{ArenaNode, TableArena, TableId};
pub use deriver::{MappedPath, RelationTreeDeriver};
pub use feature_type::{FeatureTypeMapping, PropertyMapping, PropertyRole};
pub use path::{is_path_prefix, JoinCondition, JoinType, SourcePath, TableSegment, JUNCTION_MARKER};
pub use relation::{Junction, RelationEdge, RelationKind};
pub use schema::{Column, ColumnKind, TableSchema};
