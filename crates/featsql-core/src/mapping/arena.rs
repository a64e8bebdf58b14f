//! Flattened view of a relation tree.
//!
//! Read paths address tables by small integer ids instead of path strings.
//! Ids follow the tree's pre-order, so the root is always `TableId(0)` and
//! a parent's id is smaller than any of its descendants'.

use super::relation::RelationKind;
use super::schema::TableSchema;

/// Index of a table in a [`TableArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub usize);

/// One table of the arena.
#[derive(Debug, Clone)]
pub struct ArenaNode {
    pub name: String,
    pub path: String,
    pub kind: RelationKind,
    pub parent: Option<TableId>,
    pub depth: usize,
    pub children: Vec<TableId>,
    /// Whether the table owns at least one column.
    pub has_columns: bool,
}

/// Tables of one relation tree, indexed by [`TableId`].
#[derive(Debug, Clone)]
pub struct TableArena {
    nodes: Vec<ArenaNode>,
}

impl TableArena {
    /// Flatten a tree.
    pub fn new(root: &TableSchema) -> Self {
        let mut arena = Self { nodes: Vec::new() };
        arena.push(root, None, 0);
        arena
    }

    fn push(&mut self, schema: &TableSchema, parent: Option<TableId>, depth: usize) -> TableId {
        let id = TableId(self.nodes.len());
        self.nodes.push(ArenaNode {
            name: schema.name.clone(),
            path: schema.path.clone(),
            kind: schema.kind(),
            parent,
            depth,
            children: Vec::new(),
            has_columns: !schema.columns.is_empty(),
        });
        for child in &schema.children {
            let child_id = self.push(child, Some(id), depth + 1);
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    /// The root table.
    pub fn root(&self) -> TableId {
        TableId(0)
    }

    /// Get a node.
    pub fn get(&self, id: TableId) -> Option<&ArenaNode> {
        self.nodes.get(id.0)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All ids in pre-order.
    pub fn ids(&self) -> impl Iterator<Item = TableId> {
        (0..self.nodes.len()).map(TableId)
    }

    /// Resolve a table path.
    pub fn id_of(&self, path: &str) -> Option<TableId> {
        let path = path.trim_start_matches('/');
        self.nodes.iter().position(|n| n.path == path).map(TableId)
    }

    /// Tables from the root down to `id`, inclusive.
    pub fn chain(&self, id: TableId) -> Vec<TableId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(table) = current {
            chain.push(table);
            current = self.get(table).and_then(|n| n.parent);
        }
        chain.reverse();
        chain
    }

    /// All descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: TableId) -> Vec<TableId> {
        let mut out = Vec::new();
        let mut stack: Vec<TableId> = self
            .get(id)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(node) = self.get(next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }
}
