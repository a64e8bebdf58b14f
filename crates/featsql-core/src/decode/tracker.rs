//! Repetition counters for nested tables during a read.

use crate::mapping::{TableArena, TableId};
use tracing::trace;

/// Tracks, per table, the last id seen and how many distinct ids followed
/// each other under the current parent row.
#[derive(Debug, Clone)]
pub struct MultiplicityTracker {
    multi_valued: Vec<bool>,
    descendants: Vec<Vec<TableId>>,
    last_ids: Vec<Option<String>>,
    counters: Vec<usize>,
}

impl MultiplicityTracker {
    pub fn new(arena: &TableArena) -> Self {
        let len = arena.len();
        Self {
            multi_valued: arena
                .ids()
                .map(|id| arena.get(id).map(|n| n.kind.is_multi_valued()).unwrap_or(false))
                .collect(),
            descendants: arena.ids().map(|id| arena.descendants(id)).collect(),
            last_ids: vec![None; len],
            counters: vec![0; len],
        }
    }

    /// Forget everything; called at each new feature.
    pub fn reset(&mut self) {
        self.last_ids.iter_mut().for_each(|id| *id = None);
        self.counters.iter_mut().for_each(|c| *c = 0);
    }

    /// Record a row whose tables from the root down are `chain` with the ids
    /// `ids`, and return the repetition index (1-based) of every multi-valued
    /// table on the chain.
    pub fn track(&mut self, chain: &[TableId], ids: &[Option<&str>]) -> Vec<usize> {
        for (table, id) in chain.iter().zip(ids.iter()) {
            let changed = self.last_ids[table.0].as_deref() != *id;
            if changed {
                self.counters[table.0] += 1;
                self.last_ids[table.0] = id.map(str::to_string);
                for descendant in &self.descendants[table.0] {
                    self.counters[descendant.0] = 0;
                    self.last_ids[descendant.0] = None;
                }
                trace!(
                    table = table.0,
                    count = self.counters[table.0],
                    "multiplicity advanced"
                );
            }
        }

        chain
            .iter()
            .filter(|t| self.multi_valued[t.0])
            .map(|t| self.counters[t.0])
            .collect()
    }

    /// Current counter of a table.
    pub fn count(&self, table: TableId) -> usize {
        self.counters.get(table.0).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::RelationTreeDeriver;

    fn tracker() -> (TableArena, MultiplicityTracker) {
        let schema = RelationTreeDeriver::derive_paths(&[
            "parcel/name",
            "parcel/[id=parcel_id]address/street",
            "parcel/[id=parcel_id]address/[id=address_id]phone/number",
            "parcel/[id=id]extra/note",
        ])
        .unwrap();
        let arena = TableArena::new(&schema);
        let tracker = MultiplicityTracker::new(&arena);
        (arena, tracker)
    }

    #[test]
    fn test_counts_repetitions() {
        let (arena, mut tracker) = tracker();
        let address = arena.chain(arena.id_of("parcel/[id=parcel_id]address").unwrap());

        assert_eq!(tracker.track(&address, &[Some("1"), Some("10")]), vec![1]);
        assert_eq!(tracker.track(&address, &[Some("1"), Some("10")]), vec![1]);
        assert_eq!(tracker.track(&address, &[Some("1"), Some("11")]), vec![2]);
    }

    #[test]
    fn test_ancestor_change_resets_descendants() {
        let (arena, mut tracker) = tracker();
        let address = arena.chain(arena.id_of("parcel/[id=parcel_id]address").unwrap());
        let phone = arena.chain(
            arena
                .id_of("parcel/[id=parcel_id]address/[id=address_id]phone")
                .unwrap(),
        );

        assert_eq!(tracker.track(&address, &[Some("1"), Some("10")]), vec![1]);
        assert_eq!(tracker.track(&phone, &[Some("1"), Some("10"), Some("100")]), vec![1, 1]);
        assert_eq!(tracker.track(&phone, &[Some("1"), Some("10"), Some("101")]), vec![1, 2]);
        assert_eq!(tracker.track(&address, &[Some("1"), Some("11")]), vec![2]);
        assert_eq!(tracker.track(&phone, &[Some("1"), Some("11"), Some("102")]), vec![2, 1]);
    }

    #[test]
    fn test_single_valued_tables_not_reported() {
        let (arena, mut tracker) = tracker();
        let extra = arena.chain(arena.id_of("parcel/[id=id]extra").unwrap());
        assert!(tracker.track(&extra, &[Some("1"), Some("1")]).is_empty());
        assert_eq!(tracker.count(extra[1]), 1);
    }

    #[test]
    fn test_reset() {
        let (arena, mut tracker) = tracker();
        let address = arena.chain(arena.id_of("parcel/[id=parcel_id]address").unwrap());
        tracker.track(&address, &[Some("1"), Some("10")]);
        tracker.track(&address, &[Some("1"), Some("11")]);
        tracker.reset();
        assert_eq!(tracker.track(&address, &[Some("2"), Some("11")]), vec![1]);
    }
}
