//! Relation tree derivation.
//!
//! Source paths are merged segment by segment into a trie rooted at the
//! feature type's main table. A junction segment followed by another table
//! collapses into a single many-to-many child; every other segment becomes
//! its own child. Each child is classified once from the evidence in its
//! join condition:
//!
//! | join `[src=tgt]`                          | kind                   |
//! |-------------------------------------------|------------------------|
//! | `src` = parent key, `tgt` = child key     | `OneToOneMerge`        |
//! | `src` = parent key only                   | `OneToMany`            |
//! | `tgt` = child key only                    | `OneToOneReference`    |
//! | junction then target                      | `ManyToMany`           |
//! | junction as the last table                | `OneToMany`            |

use super::feature_type::{FeatureTypeMapping, PropertyRole};
use super::path::{SourcePath, TableSegment};
use super::relation::{Junction, RelationEdge, RelationKind};
use super::schema::{Column, ColumnKind, TableSchema};
use crate::error::{Error, Result};
use tracing::{debug, info};

/// A parsed source path with the property it feeds.
#[derive(Debug, Clone)]
pub struct MappedPath {
    /// Feature property name.
    pub property: String,
    /// Parsed path.
    pub source: SourcePath,
    /// Kind of the terminal columns.
    pub kind: ColumnKind,
}

impl MappedPath {
    /// Parse a path whose property is named after the path itself.
    pub fn parse(path: &str) -> Result<Self> {
        let source = SourcePath::parse(path)?;
        Ok(Self {
            property: source.raw.clone(),
            source,
            kind: ColumnKind::Value,
        })
    }
}

/// Builds [`TableSchema`] trees from source paths.
pub struct RelationTreeDeriver;

/// Trie node used while merging paths.
struct Node {
    /// Segment text identifying this child under its parent.
    key: String,
    /// The table segment, or the target segment for a junction pair.
    segment: TableSegment,
    junction: Option<TableSegment>,
    columns: Vec<Column>,
    children: Vec<Node>,
    /// First path that introduced this node, for error messages.
    origin: String,
}

impl Node {
    fn new(key: String, segment: TableSegment, junction: Option<TableSegment>, origin: &str) -> Self {
        Self {
            key,
            segment,
            junction,
            columns: Vec::new(),
            children: Vec::new(),
            origin: origin.to_string(),
        }
    }

    fn child_mut(
        &mut self,
        key: String,
        segment: &TableSegment,
        junction: Option<&TableSegment>,
        origin: &str,
    ) -> &mut Node {
        let index = match self.children.iter().position(|c| c.key == key) {
            Some(index) => index,
            None => {
                self.children
                    .push(Node::new(key, segment.clone(), junction.cloned(), origin));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    fn add_column(&mut self, column: Column) {
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }
}

impl RelationTreeDeriver {
    /// Derive the tree for a feature type mapping.
    pub fn derive_mapping(mapping: &FeatureTypeMapping) -> Result<TableSchema> {
        let mut paths = vec![MappedPath {
            property: String::new(),
            source: SourcePath::parse(&mapping.source_path)?,
            kind: ColumnKind::Value,
        }];

        for property in &mapping.properties {
            let resolved = mapping.resolve(property);
            let source = SourcePath::parse(&resolved)?;
            if property.role == PropertyRole::Object && !source.is_object() {
                return Err(Error::mapping(
                    &resolved,
                    format!("object property '{}' must address a table", property.name),
                ));
            }
            let kind = match (&property.constant, property.role) {
                (Some(value), _) => ColumnKind::Constant(value.clone()),
                (None, PropertyRole::Id) => ColumnKind::Identifier,
                (None, PropertyRole::Geometry) => ColumnKind::Spatial,
                (None, PropertyRole::Datetime) => ColumnKind::Temporal,
                (None, PropertyRole::Date) => ColumnKind::Date,
                (None, PropertyRole::Value | PropertyRole::Object) => ColumnKind::Value,
            };
            paths.push(MappedPath {
                property: property.name.clone(),
                source,
                kind,
            });
        }

        let schema = Self::derive(&paths)?;
        info!(
            feature_type = %mapping.name,
            root = %schema.name,
            tables = schema.tables().len(),
            "derived relation tree"
        );
        Ok(schema)
    }

    /// Derive a tree from raw path strings; properties are named after their paths.
    pub fn derive_paths(paths: &[&str]) -> Result<TableSchema> {
        let paths = paths
            .iter()
            .map(|p| MappedPath::parse(p))
            .collect::<Result<Vec<_>>>()?;
        Self::derive(&paths)
    }

    /// Derive a tree from parsed paths. The first path fixes the root table.
    pub fn derive(paths: &[MappedPath]) -> Result<TableSchema> {
        let first = paths
            .first()
            .ok_or_else(|| Error::mapping("", "no source paths given"))?;
        let root_segment = first.source.root().clone();
        let mut root = Node::new(
            root_segment.raw.clone(),
            root_segment,
            None,
            &first.source.raw,
        );

        for path in paths {
            Self::insert(&mut root, path)?;
        }

        let root_path = root.key.clone();
        Self::build(root, root_path, None, &[])
    }

    fn insert(root: &mut Node, path: &MappedPath) -> Result<()> {
        let source = &path.source;
        let first = source.root();
        if first.name != root.segment.name {
            return Err(Error::mapping(
                &source.raw,
                format!("path does not start at root table '{}'", root.segment.name),
            ));
        }
        if first.raw != root.key {
            if root.segment.has_flags() && first.has_flags() {
                return Err(Error::mapping(
                    &source.raw,
                    format!("conflicting flags for root table '{}'", first.name),
                ));
            }
            if first.has_flags() {
                root.key = first.raw.clone();
                root.segment = first.clone();
            }
        }

        let mut node = root;
        let mut i = 1;
        while i < source.tables.len() {
            let segment = &source.tables[i];
            if segment.join.is_none() {
                return Err(Error::mapping(
                    &source.raw,
                    format!("table '{}' has no join condition", segment.name),
                ));
            }

            match source.tables.get(i + 1) {
                Some(target) if segment.is_junction() => {
                    if target.join.is_none() {
                        return Err(Error::mapping(
                            &source.raw,
                            format!("table '{}' has no join condition", target.name),
                        ));
                    }
                    if segment.filter.is_some() {
                        return Err(Error::mapping(
                            &source.raw,
                            format!("junction '{}' cannot carry a filter", segment.name),
                        ));
                    }
                    let key = format!("{}/{}", segment.raw, target.raw);
                    node = node.child_mut(key, target, Some(segment), &source.raw);
                    i += 2;
                }
                _ => {
                    node = node.child_mut(segment.raw.clone(), segment, None, &source.raw);
                    i += 1;
                }
            }
        }

        for name in &source.columns {
            node.add_column(Column {
                name: name.clone(),
                property: path.property.clone(),
                kind: path.kind.clone(),
            });
        }
        Ok(())
    }

    fn build(
        node: Node,
        path: String,
        parent: Option<&TableSegment>,
        parent_relations: &[RelationEdge],
    ) -> Result<TableSchema> {
        let mut relation_path = parent_relations.to_vec();
        if let Some(parent) = parent {
            relation_path.push(Self::classify(&node, parent)?);
        }

        let children = node
            .children
            .into_iter()
            .map(|child| {
                let child_path = format!("{}/{}", path, child.key);
                Self::build(child, child_path, Some(&node.segment), &relation_path)
            })
            .collect::<Result<Vec<_>>>()?;

        let segment = node.segment;
        let schema = TableSchema {
            sort_key: segment.sort_key().to_string(),
            primary_key: segment.primary_key().to_string(),
            sort_key_unique: segment.sort_key_unique,
            name: segment.name,
            filter: segment.filter,
            path,
            relation_path,
            columns: node.columns,
            children,
        };

        debug!(
            table = %schema.name,
            path = %schema.path,
            kind = %schema.kind(),
            columns = schema.columns.len(),
            "derived table"
        );
        Ok(schema)
    }

    fn classify(node: &Node, parent: &TableSegment) -> Result<RelationEdge> {
        let child = &node.segment;
        let join = child
            .join
            .as_ref()
            .ok_or_else(|| Error::mapping(&node.origin, format!("table '{}' has no join condition", child.name)))?;

        if let Some(junction) = &node.junction {
            let into_junction = junction.join.as_ref().ok_or_else(|| {
                Error::mapping(
                    &node.origin,
                    format!("junction '{}' has no join condition", junction.name),
                )
            })?;
            return Ok(RelationEdge {
                kind: RelationKind::ManyToMany,
                source_table: parent.name.clone(),
                source_field: into_junction.source_field.clone(),
                source_primary_key: parent.primary_key().to_string(),
                target_table: child.name.clone(),
                target_field: join.target_field.clone(),
                target_primary_key: child.primary_key().to_string(),
                junction: Some(Junction {
                    table: junction.name.clone(),
                    source_field: into_junction.target_field.clone(),
                    target_field: join.source_field.clone(),
                    join_type: junction.join_type,
                }),
                join_type: child.join_type,
                target_filter: child.filter.clone(),
            });
        }

        let source_is_key = join.source_field == parent.primary_key();
        let target_is_key = join.target_field == child.primary_key();
        let kind = if child.is_junction() {
            RelationKind::OneToMany
        } else {
            match (source_is_key, target_is_key) {
                (true, true) => RelationKind::OneToOneMerge,
                (true, false) => RelationKind::OneToMany,
                (false, true) => RelationKind::OneToOneReference,
                (false, false) => {
                    return Err(Error::mapping(
                        &node.origin,
                        format!(
                            "join [{}={}] references neither the key of '{}' nor the key of '{}'",
                            join.source_field, join.target_field, parent.name, child.name
                        ),
                    ))
                }
            }
        };

        Ok(RelationEdge {
            kind,
            source_table: parent.name.clone(),
            source_field: join.source_field.clone(),
            source_primary_key: parent.primary_key().to_string(),
            target_table: child.name.clone(),
            target_field: join.target_field.clone(),
            target_primary_key: child.primary_key().to_string(),
            junction: None,
            join_type: child.join_type,
            target_filter: child.filter.clone(),
        })
    }
}
