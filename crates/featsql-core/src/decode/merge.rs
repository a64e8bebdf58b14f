//! N-way merge of join group row streams.
//!
//! Each value query returns its rows ordered by its own sort keys. Two
//! groups share the leading sort keys of their common ancestor tables, so
//! comparing rows on that shared prefix puts every row right after the rows
//! of its ancestors. Ties go to the group declared first, which is always
//! the ancestor.

use super::row::{MergedRow, RowStream, SqlRow, ValueKind};
use crate::error::{Error, Result};
use std::cmp::Ordering;
use tracing::trace;

/// Sort key layout of one row source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortLayout {
    /// Name of each leading sort column; equal names across sources denote
    /// the same key.
    pub names: Vec<String>,
    /// Per sort column, whether it is ordered descending.
    pub descending: Vec<bool>,
}

impl SortLayout {
    pub fn new(names: Vec<String>) -> Self {
        let descending = vec![false; names.len()];
        Self { names, descending }
    }

    /// Mark the first `flags.len()` columns ascending or descending.
    pub fn with_descending(mut self, flags: &[bool]) -> Self {
        for (slot, flag) in self.descending.iter_mut().zip(flags) {
            *slot = *flag;
        }
        self
    }

    /// Number of leading columns both layouts share.
    fn common_prefix(&self, other: &SortLayout) -> usize {
        self.names
            .iter()
            .zip(other.names.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }
}

/// Merge scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    /// No row pulled yet.
    Init,
    /// Every live source has one buffered row.
    Running,
    /// All sources are exhausted.
    Done,
    /// A source failed; nothing more is emitted.
    Failed,
}

struct Source<'a> {
    layout: SortLayout,
    rows: RowStream<'a>,
    pending: Option<SqlRow>,
}

/// Merges ordered row streams into one stream ordered on shared sort keys.
///
/// Holds at most one pending row per source.
pub struct RowMerger<'a> {
    sources: Vec<Source<'a>>,
    state: MergeState,
}

impl<'a> RowMerger<'a> {
    /// Create a merger. Sources are given in priority order.
    pub fn new(sources: Vec<(SortLayout, RowStream<'a>)>) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|(layout, rows)| Source {
                    layout,
                    rows,
                    pending: None,
                })
                .collect(),
            state: MergeState::Init,
        }
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    fn pull(&mut self, index: usize) -> Result<()> {
        let source = &mut self.sources[index];
        source.pending = match source.rows.next() {
            None => None,
            Some(Ok(row)) => Some(row),
            Some(Err(e)) => return Err(Error::Execution(e)),
        };
        Ok(())
    }

    /// Index of the source whose pending row comes first.
    fn next_source(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (index, source) in self.sources.iter().enumerate() {
            let Some(row) = &source.pending else {
                continue;
            };
            best = match best {
                None => Some(index),
                Some(current) => {
                    let leader = &self.sources[current];
                    let ordering = leader
                        .pending
                        .as_ref()
                        .map(|lead| compare(&leader.layout, lead, &source.layout, row))
                        .unwrap_or(Ordering::Greater);
                    // equal rows keep the earlier source
                    if ordering == Ordering::Greater {
                        Some(index)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best
    }

    fn step(&mut self) -> Result<Option<MergedRow>> {
        if self.state == MergeState::Init {
            for index in 0..self.sources.len() {
                self.pull(index)?;
            }
            self.state = MergeState::Running;
        }

        let Some(index) = self.next_source() else {
            self.state = MergeState::Done;
            return Ok(None);
        };
        let row = self.sources[index].pending.take();
        self.pull(index)?;
        trace!(group = index, "merged row");
        Ok(row.map(|row| MergedRow { group: index, row }))
    }
}

impl Iterator for RowMerger<'_> {
    type Item = Result<MergedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            MergeState::Done | MergeState::Failed => None,
            MergeState::Init | MergeState::Running => match self.step() {
                Ok(row) => row.map(Ok),
                Err(e) => {
                    self.state = MergeState::Failed;
                    Some(Err(e))
                }
            },
        }
    }
}

/// Compare two rows on the sort columns their layouts share.
pub fn compare(left_layout: &SortLayout, left: &SqlRow, right_layout: &SortLayout, right: &SqlRow) -> Ordering {
    let shared = left_layout.common_prefix(right_layout);
    for i in 0..shared {
        let ordering = compare_values((left.get(i), left.kind(i)), (right.get(i), right.kind(i)));
        let ordering = if left_layout.descending.get(i).copied().unwrap_or(false) {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Compare two values the way SQL orders them: NULL lowest, numbers
/// numerically, then text, then blobs.
fn compare_values(left: (Option<&str>, ValueKind), right: (Option<&str>, ValueKind)) -> Ordering {
    let ((Some(l), lk), (Some(r), rk)) = (left, right) else {
        return left.0.is_some().cmp(&right.0.is_some());
    };
    match (lk, rk) {
        (ValueKind::Integer, ValueKind::Integer) => match (l.parse::<i64>(), r.parse::<i64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => l.cmp(r),
        },
        (lk, rk) if lk.is_numeric() && rk.is_numeric() => match (l.parse::<f64>(), r.parse::<f64>()) {
            (Ok(a), Ok(b)) => a.total_cmp(&b),
            _ => l.cmp(r),
        },
        (lk, rk) if lk.is_numeric() || rk.is_numeric() => rk.is_numeric().cmp(&lk.is_numeric()),
        (lk, rk) if lk != rk => lk.cmp(&rk),
        _ => l.cmp(r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::row::row_stream;
    use crate::error::{ExecutionError, ExecutionErrorKind};

    fn layout(names: &[&str]) -> SortLayout {
        SortLayout::new(names.iter().map(|n| n.to_string()).collect())
    }

    fn rows(values: &[&[&str]]) -> Vec<SqlRow> {
        values
            .iter()
            .map(|r| SqlRow::new(r.iter().map(|v| Some(v.to_string())).collect()))
            .collect()
    }

    fn int_rows(values: &[&[&str]]) -> Vec<SqlRow> {
        rows(values)
            .into_iter()
            .map(|row| {
                let kinds = vec![ValueKind::Integer; row.len()];
                row.with_kinds(kinds)
            })
            .collect()
    }

    fn merged(merger: RowMerger<'_>) -> Vec<(usize, Vec<String>)> {
        merger
            .map(|r| {
                let r = r.unwrap();
                (r.group, r.row.values.into_iter().map(|v| v.unwrap_or_default()).collect())
            })
            .collect()
    }

    #[test]
    fn test_single_child() {
        let merger = RowMerger::new(vec![
            (layout(&["p"]), row_stream(rows(&[&["1", "a"], &["2", "b"]]))),
            (
                layout(&["p", "p/addr"]),
                row_stream(rows(&[&["1", "10", "x"], &["1", "11", "y"], &["2", "12", "z"]])),
            ),
        ]);
        let groups: Vec<usize> = merged(merger).into_iter().map(|(g, _)| g).collect();
        assert_eq!(groups, vec![0, 1, 1, 0, 1]);
    }

    #[test]
    fn test_integer_keys_order_numerically() {
        let merger = RowMerger::new(vec![
            (layout(&["p"]), row_stream(int_rows(&[&["2"], &["10"]]))),
            (layout(&["p", "p/a"]), row_stream(int_rows(&[&["2", "1"], &["10", "1"]]))),
        ]);
        let out = merged(merger);
        assert_eq!(out[0], (0, vec!["2".to_string()]));
        assert_eq!(out[1], (1, vec!["2".to_string(), "1".to_string()]));
        assert_eq!(out[2], (0, vec!["10".to_string()]));
    }

    #[test]
    fn test_sibling_groups_stay_contiguous_per_ancestor() {
        let merger = RowMerger::new(vec![
            (layout(&["p"]), row_stream(rows(&[&["1"], &["2"]]))),
            (layout(&["p", "p/tag"]), row_stream(rows(&[&["1", "5"], &["1", "6"], &["2", "5"]]))),
            (layout(&["p", "p/addr"]), row_stream(rows(&[&["1", "9"], &["2", "8"]]))),
        ]);
        let out: Vec<(usize, String)> = merged(merger)
            .into_iter()
            .map(|(g, v)| (g, v[0].clone()))
            .collect();
        assert_eq!(
            out,
            vec![
                (0, "1".into()),
                (1, "1".into()),
                (1, "1".into()),
                (2, "1".into()),
                (0, "2".into()),
                (1, "2".into()),
                (2, "2".into()),
            ]
        );
    }

    #[test]
    fn test_doubly_nested() {
        let merger = RowMerger::new(vec![
            (layout(&["p"]), row_stream(rows(&[&["1"]]))),
            (layout(&["p", "a"]), row_stream(rows(&[&["1", "1"], &["1", "2"]]))),
            (
                layout(&["p", "a", "ph"]),
                row_stream(rows(&[&["1", "1", "7"], &["1", "1", "8"], &["1", "2", "9"]])),
            ),
        ]);
        let groups: Vec<usize> = merged(merger).into_iter().map(|(g, _)| g).collect();
        assert_eq!(groups, vec![0, 1, 2, 2, 1, 2]);
    }

    #[test]
    fn test_descending_caller_key() {
        let merger = RowMerger::new(vec![
            (
                layout(&["CSKEY_0", "p"]).with_descending(&[true]),
                row_stream(rows(&[&["b", "1"], &["a", "2"]])),
            ),
            (
                layout(&["CSKEY_0", "p", "p/a"]).with_descending(&[true]),
                row_stream(rows(&[&["b", "1", "5"], &["a", "2", "6"]])),
            ),
        ]);
        let groups: Vec<usize> = merged(merger).into_iter().map(|(g, _)| g).collect();
        assert_eq!(groups, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_text_keys_order_bytewise() {
        let merger = RowMerger::new(vec![
            (layout(&["p"]), row_stream(rows(&[&["10"], &["9"]]))),
            (layout(&["p", "p/a"]), row_stream(rows(&[&["10", "1"], &["9", "1"]]))),
        ]);
        let out: Vec<(usize, String)> = merged(merger)
            .into_iter()
            .map(|(g, v)| (g, v[0].clone()))
            .collect();
        assert_eq!(
            out,
            vec![(0, "10".into()), (1, "10".into()), (0, "9".into()), (1, "9".into())]
        );
    }

    #[test]
    fn test_null_caller_key_leads_ascending() {
        let mut parents = vec![SqlRow::new(vec![None, Some("2".into())])];
        parents.extend(rows(&[&["a", "1"]]));
        let mut children = vec![SqlRow::new(vec![None, Some("2".into()), Some("20".into())])];
        children.extend(rows(&[&["a", "1", "10"]]));
        let merger = RowMerger::new(vec![
            (layout(&["CSKEY_0", "p"]), row_stream(parents)),
            (layout(&["CSKEY_0", "p", "p/a"]), row_stream(children)),
        ]);
        let out: Vec<(usize, String)> = merged(merger)
            .into_iter()
            .map(|(g, v)| (g, v[1].clone()))
            .collect();
        assert_eq!(
            out,
            vec![(0, "2".into()), (1, "2".into()), (0, "1".into()), (1, "1".into())]
        );
    }

    #[test]
    fn test_null_caller_key_trails_descending() {
        let mut parents = rows(&[&["a", "1"]]);
        parents.push(SqlRow::new(vec![None, Some("2".into())]));
        let mut children = rows(&[&["a", "1", "10"]]);
        children.push(SqlRow::new(vec![None, Some("2".into()), Some("20".into())]));
        let merger = RowMerger::new(vec![
            (layout(&["CSKEY_0", "p"]).with_descending(&[true]), row_stream(parents)),
            (
                layout(&["CSKEY_0", "p", "p/a"]).with_descending(&[true]),
                row_stream(children),
            ),
        ]);
        let out: Vec<(usize, String)> = merged(merger)
            .into_iter()
            .map(|(g, v)| (g, v[1].clone()))
            .collect();
        assert_eq!(
            out,
            vec![(0, "1".into()), (1, "1".into()), (0, "2".into()), (1, "2".into())]
        );
    }

    #[test]
    fn test_value_order_follows_storage_class() {
        let int = ValueKind::Integer;
        let text = ValueKind::Text;
        assert_eq!(compare_values((None, text), (Some("1"), int)), Ordering::Less);
        assert_eq!(compare_values((Some("b"), text), (Some("a"), text)), Ordering::Greater);
        assert_eq!(compare_values((Some("9"), int), (Some("10"), int)), Ordering::Less);
        assert_eq!(compare_values((Some("9"), text), (Some("10"), text)), Ordering::Greater);
        assert_eq!(
            compare_values((Some("2.5"), ValueKind::Real), (Some("10"), int)),
            Ordering::Less
        );
        assert_eq!(compare_values((Some("99"), int), (Some("1"), text)), Ordering::Less);
        assert_eq!(compare_values((Some("ff"), text), (Some("00"), ValueKind::Blob)), Ordering::Less);
    }

    #[test]
    fn test_source_failure_is_terminal() {
        let failing: RowStream<'static> = Box::new(
            vec![
                Ok(SqlRow::of(&[Some("1")])),
                Err(ExecutionError::new(ExecutionErrorKind::Connection, "closed")),
            ]
            .into_iter(),
        );
        let mut merger = RowMerger::new(vec![(layout(&["p"]), failing)]);
        assert!(matches!(merger.next(), Some(Err(Error::Execution(_)))));
        assert_eq!(merger.state(), MergeState::Failed);
        assert!(merger.next().is_none());
    }

    #[test]
    fn test_empty_sources() {
        let mut merger = RowMerger::new(vec![(layout(&["p"]), row_stream(vec![]))]);
        assert!(merger.next().is_none());
        assert_eq!(merger.state(), MergeState::Done);
    }
}
