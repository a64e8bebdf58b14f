//! Turns merged rows back into feature events.

use super::merge::SortLayout;
use super::row::MergedRow;
use super::tracker::MultiplicityTracker;
use crate::error::{Error, Result};
use crate::mapping::{Column, ColumnKind, TableArena, TableId};
use crate::sql::{QueryTemplates, CSKEY};
use featsql_proto::FeatureEvent;
use tracing::{debug, trace};

/// Row layout of one join group.
#[derive(Debug, Clone)]
struct GroupLayout {
    path: String,
    chain: Vec<TableId>,
    columns: Vec<Column>,
    /// Position of the identifier column among `columns`.
    identifier: Option<usize>,
    sort: SortLayout,
}

/// Rebuilds features from rows merged across join groups.
///
/// Each row is `caller keys, chain sort keys, columns`. A change of the
/// root sort key closes the open feature and opens the next one.
#[derive(Debug)]
pub struct FeatureReconstructor {
    feature_type: String,
    caller_keys: usize,
    groups: Vec<GroupLayout>,
    tracker: MultiplicityTracker,
    current: Option<String>,
    rows: usize,
    features: usize,
}

impl FeatureReconstructor {
    /// Create a reconstructor for rows of `templates` rendered with
    /// `caller_keys` caller sort keys.
    pub fn new(templates: &QueryTemplates, caller_keys: &[bool]) -> Result<Self> {
        let arena = TableArena::new(templates.root());
        let caller_names: Vec<String> = (0..caller_keys.len())
            .map(|i| format!("{}_{}", CSKEY, i))
            .collect();

        let groups = templates
            .value_templates()
            .iter()
            .map(|template| {
                let chain = template
                    .sort_fields()
                    .iter()
                    .map(|field| {
                        arena.id_of(&field.name).ok_or_else(|| {
                            Error::Internal(format!("sort field of unknown table {}", field.name))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let columns = template.columns().to_vec();
                let identifier = columns
                    .iter()
                    .position(|c| c.kind == ColumnKind::Identifier);
                let mut names = caller_names.clone();
                names.extend(template.sort_fields().iter().map(|f| f.name.clone()));
                Ok(GroupLayout {
                    path: template.path().to_string(),
                    chain,
                    columns,
                    identifier,
                    sort: SortLayout::new(names).with_descending(caller_keys),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            feature_type: templates.feature_type().to_string(),
            caller_keys: caller_keys.len(),
            groups,
            tracker: MultiplicityTracker::new(&arena),
            current: None,
            rows: 0,
            features: 0,
        })
    }

    /// Sort layout of every group, in group order.
    pub fn layouts(&self) -> Vec<SortLayout> {
        self.groups.iter().map(|g| g.sort.clone()).collect()
    }

    /// Number of features opened so far.
    pub fn features(&self) -> usize {
        self.features
    }

    /// Consume one merged row.
    pub fn push(&mut self, merged: MergedRow) -> Result<Vec<FeatureEvent>> {
        let index = self.rows;
        self.rows += 1;

        let group = self
            .groups
            .get(merged.group)
            .ok_or_else(|| Error::Internal(format!("row of unknown group {}", merged.group)))?;
        let keys_end = self.caller_keys + group.chain.len();
        if merged.row.len() < keys_end + group.columns.len() {
            return Err(Error::RowReconstruction {
                path: group.path.clone(),
                row: index,
            });
        }

        let keys: Vec<Option<&str>> = (self.caller_keys..keys_end)
            .map(|i| merged.row.get(i))
            .collect();
        if keys.iter().any(Option::is_none) {
            trace!(path = %group.path, row = index, "skipping row without related table row");
            return Ok(vec![]);
        }
        let root_key = keys.first().copied().flatten().unwrap_or_default();

        let mut events = Vec::new();
        if self.current.as_deref() != Some(root_key) {
            if self.current.is_some() {
                events.push(FeatureEvent::FeatureEnd);
            }
            let id = group
                .identifier
                .filter(|_| merged.group == 0)
                .and_then(|i| merged.row.get(keys_end + i))
                .unwrap_or(root_key);
            events.push(FeatureEvent::FeatureStart {
                feature_type: self.feature_type.clone(),
                id: id.to_string(),
            });
            self.tracker.reset();
            self.current = Some(root_key.to_string());
            self.features += 1;
        }

        let multiplicities = self.tracker.track(&group.chain, &keys);
        for (i, column) in group.columns.iter().enumerate() {
            events.push(FeatureEvent::PropertyStart {
                property: column.property.clone(),
                multiplicities: multiplicities.clone(),
            });
            if let Some(value) = merged.row.get(keys_end + i) {
                events.push(FeatureEvent::Text {
                    value: value.to_string(),
                });
            }
            events.push(FeatureEvent::PropertyEnd {
                property: column.property.clone(),
            });
        }
        Ok(events)
    }

    /// Close the open feature and the stream.
    pub fn finish(&mut self) -> Vec<FeatureEvent> {
        let mut events = Vec::new();
        if self.current.take().is_some() {
            events.push(FeatureEvent::FeatureEnd);
        }
        events.push(FeatureEvent::End);
        debug!(
            feature_type = %self.feature_type,
            features = self.features,
            rows = self.rows,
            "reconstruction finished"
        );
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::SqlRow;
    use crate::mapping::{FeatureTypeMapping, PropertyMapping, PropertyRole, RelationTreeDeriver};
    use crate::sql::PostGis;
    use pretty_assertions::assert_eq;

    fn templates() -> QueryTemplates {
        let mapping = FeatureTypeMapping::new("parcels", "parcel")
            .with_property(PropertyMapping::new("id", "id").with_role(PropertyRole::Id))
            .with_property(PropertyMapping::new("city", "[id=parcel_id]address/city"));
        let root = RelationTreeDeriver::derive_mapping(&mapping).unwrap();
        QueryTemplates::new("parcels", root, Box::new(PostGis)).unwrap()
    }

    fn row(group: usize, values: &[Option<&str>]) -> MergedRow {
        MergedRow {
            group,
            row: SqlRow::of(values),
        }
    }

    fn property(name: &str, multiplicities: Vec<usize>, value: Option<&str>) -> Vec<FeatureEvent> {
        let mut events = vec![FeatureEvent::PropertyStart {
            property: name.to_string(),
            multiplicities,
        }];
        if let Some(value) = value {
            events.push(FeatureEvent::Text {
                value: value.to_string(),
            });
        }
        events.push(FeatureEvent::PropertyEnd {
            property: name.to_string(),
        });
        events
    }

    #[test]
    fn test_features_with_repeated_children() {
        let templates = templates();
        let mut reconstructor = FeatureReconstructor::new(&templates, &[]).unwrap();
        let mut events = Vec::new();
        for merged in [
            row(0, &[Some("1"), Some("p-1")]),
            row(1, &[Some("1"), Some("10"), Some("Bonn")]),
            row(1, &[Some("1"), Some("11"), None]),
            row(0, &[Some("2"), Some("p-2")]),
        ] {
            events.extend(reconstructor.push(merged).unwrap());
        }
        events.extend(reconstructor.finish());

        let mut expected = vec![FeatureEvent::FeatureStart {
            feature_type: "parcels".into(),
            id: "p-1".into(),
        }];
        expected.extend(property("id", vec![], Some("p-1")));
        expected.extend(property("city", vec![1], Some("Bonn")));
        expected.extend(property("city", vec![2], None));
        expected.push(FeatureEvent::FeatureEnd);
        expected.push(FeatureEvent::FeatureStart {
            feature_type: "parcels".into(),
            id: "p-2".into(),
        });
        expected.extend(property("id", vec![], Some("p-2")));
        expected.push(FeatureEvent::FeatureEnd);
        expected.push(FeatureEvent::End);

        assert_eq!(events, expected);
        assert_eq!(reconstructor.features(), 2);
    }

    #[test]
    fn test_row_without_child_is_skipped() {
        let templates = templates();
        let mut reconstructor = FeatureReconstructor::new(&templates, &[]).unwrap();
        reconstructor.push(row(0, &[Some("1"), Some("1")])).unwrap();
        let events = reconstructor.push(row(1, &[Some("1"), None, None])).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_short_row_is_rejected() {
        let templates = templates();
        let mut reconstructor = FeatureReconstructor::new(&templates, &[]).unwrap();
        let err = reconstructor.push(row(1, &[Some("1"), Some("10")])).unwrap_err();
        assert!(matches!(
            err,
            Error::RowReconstruction { path, row: 0 } if path == "parcel/[id=parcel_id]address"
        ));
    }

    #[test]
    fn test_caller_keys_shift_columns() {
        let templates = templates();
        let mut reconstructor = FeatureReconstructor::new(&templates, &[true]).unwrap();
        let events = reconstructor
            .push(row(0, &[Some("zeta"), Some("4"), Some("p-4")]))
            .unwrap();
        assert_eq!(
            events[0],
            FeatureEvent::FeatureStart {
                feature_type: "parcels".into(),
                id: "p-4".into()
            }
        );
        assert_eq!(
            reconstructor.layouts()[1],
            SortLayout::new(vec![
                "CSKEY_0".into(),
                "parcel".into(),
                "parcel/[id=parcel_id]address".into()
            ])
            .with_descending(&[true])
        );
    }

    #[test]
    fn test_empty_stream() {
        let templates = templates();
        let mut reconstructor = FeatureReconstructor::new(&templates, &[]).unwrap();
        assert_eq!(reconstructor.finish(), vec![FeatureEvent::End]);
    }
}
