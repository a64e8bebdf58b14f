//! Structural events emitted while reconstructing features from rows.

use serde::{Deserialize, Serialize};

/// One step of a reconstructed feature stream.
///
/// A stream is `Start`, then per feature `FeatureStart`, any number of
/// property triples, `FeatureEnd`, and finally `End`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeatureEvent {
    /// Result metadata.
    Start {
        number_returned: u64,
        number_matched: Option<u64>,
        single_feature: bool,
    },
    /// A new feature begins.
    FeatureStart { feature_type: String, id: String },
    /// A property value begins. `multiplicities` holds the repetition index
    /// (1-based) of every multi-valued table on the value's path.
    PropertyStart {
        property: String,
        multiplicities: Vec<usize>,
    },
    /// Property text; omitted for SQL NULL.
    Text { value: String },
    /// The current property ends.
    PropertyEnd { property: String },
    /// The current feature ends.
    FeatureEnd,
    /// The stream ends.
    End,
}

impl FeatureEvent {
    /// Check if this event opens a feature.
    pub fn is_feature_start(&self) -> bool {
        matches!(self, FeatureEvent::FeatureStart { .. })
    }
}
