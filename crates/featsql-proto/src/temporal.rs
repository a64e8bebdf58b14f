//! Temporal literals appearing in temporal filter predicates.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One end of an interval literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalBound {
    /// Unbounded (`..`).
    Open,
    /// A timestamp.
    Instant(DateTime<Utc>),
    /// A calendar date.
    Date(NaiveDate),
}

/// A temporal literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalLiteral {
    /// A single timestamp.
    Instant(DateTime<Utc>),
    /// A single calendar date.
    Date(NaiveDate),
    /// An interval, both ends inclusive as written.
    Interval(IntervalBound, IntervalBound),
}

/// A literal's start and exclusive end.
///
/// Instants and dates are widened by one second or one day so that
/// half-open SQL range comparisons keep the inclusive ISO meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalRange {
    pub start: IntervalBound,
    pub end_exclusive: IntervalBound,
}

impl TemporalLiteral {
    /// Parse an instant from RFC 3339 text.
    pub fn instant(text: &str) -> Result<Self, crate::Error> {
        DateTime::parse_from_rfc3339(text)
            .map(|t| TemporalLiteral::Instant(t.with_timezone(&Utc)))
            .map_err(|e| crate::Error::InvalidLiteral(format!("{}: {}", text, e)))
    }

    /// Parse a date from `YYYY-MM-DD` text.
    pub fn date(text: &str) -> Result<Self, crate::Error> {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(TemporalLiteral::Date)
            .map_err(|e| crate::Error::InvalidLiteral(format!("{}: {}", text, e)))
    }

    /// Start and exclusive end of this literal.
    pub fn range(&self) -> TemporalRange {
        match self {
            TemporalLiteral::Instant(t) => TemporalRange {
                start: IntervalBound::Instant(*t),
                end_exclusive: next_second(*t),
            },
            TemporalLiteral::Date(d) => TemporalRange {
                start: IntervalBound::Date(*d),
                end_exclusive: next_day(*d),
            },
            TemporalLiteral::Interval(start, end) => TemporalRange {
                start: start.clone(),
                end_exclusive: match end {
                    IntervalBound::Open => IntervalBound::Open,
                    IntervalBound::Instant(t) => next_second(*t),
                    IntervalBound::Date(d) => next_day(*d),
                },
            },
        }
    }
}

fn next_second(t: DateTime<Utc>) -> IntervalBound {
    match t.checked_add_signed(Duration::seconds(1)) {
        Some(next) => IntervalBound::Instant(next),
        None => IntervalBound::Open,
    }
}

fn next_day(d: NaiveDate) -> IntervalBound {
    match d.succ_opt() {
        Some(next) => IntervalBound::Date(next),
        None => IntervalBound::Open,
    }
}
