//! Deterministic table aliases.
//!
//! Aliases are letters prefixed by one `A` per nesting level: the outer
//! query uses `A`, `B`, `C`, a sub-select one level down uses `AA`, `AB`,
//! and so on. A join chain gets one alias per table, junctions included.

use crate::mapping::RelationEdge;

/// Alias of the `index`-th table at `level`.
pub fn alias(level: usize, index: usize) -> String {
    let mut out = "A".repeat(level);
    out.push_str(&letters(index));
    out
}

fn letters(index: usize) -> String {
    let letter = char::from(b'A' + (index % 26) as u8);
    if index < 26 {
        letter.to_string()
    } else {
        format!("{}{}", letters(index / 26 - 1), letter)
    }
}

/// Yields aliases of one level in order.
#[derive(Debug, Clone)]
pub struct AliasGenerator {
    level: usize,
    next: usize,
}

impl AliasGenerator {
    /// Start at the first alias of a level.
    pub fn new(level: usize) -> Self {
        Self { level, next: 0 }
    }

    /// Aliases for the root table plus every table joined along `edges`.
    pub fn chain(edges: &[RelationEdge], level: usize) -> Vec<String> {
        let count = 1 + edges.iter().map(RelationEdge::table_count).sum::<usize>();
        Self::new(level).take(count).collect()
    }
}

impl Iterator for AliasGenerator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let current = alias(self.level, self.next);
        self.next += 1;
        Some(current)
    }
}

/// Aliases of the non-junction tables of a chain, root first.
pub fn table_aliases<'a>(edges: &[RelationEdge], aliases: &'a [String]) -> Vec<&'a str> {
    let mut out = Vec::with_capacity(edges.len() + 1);
    let mut position = 0;
    if let Some(root) = aliases.first() {
        out.push(root.as_str());
    }
    for edge in edges {
        position += edge.table_count();
        if let Some(alias) = aliases.get(position) {
            out.push(alias.as_str());
        }
    }
    out
}
