//! Count observations and their merged, aggregated forms.
//!
//! Counts flow through three shapes: a [`CountRecord`] is one side's
//! observation for one `(day, dimensions)` key; a [`MergedCount`] pairs the
//! two sides for one key with the validity decision; a [`DayVerdict`] is
//! the day-level reduction persisted to the audit trail.
//!
//! Counts are `i64` end to end because `COUNT(*)` arrives from the wire as
//! `BIGINT`; counters never produce negative values.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dimension::DimensionKey;

/// The identity key a count is observed under.
pub type CountKey = (NaiveDate, DimensionKey);

/// One side's row count for a `(day, dimensions)` key.
///
/// Immutable: created by a [`crate::counter::Counter`], consumed by the
/// merger. Two records from the same side never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountRecord {
    /// The calendar day the rows were created on.
    pub day: NaiveDate,
    /// Number of rows observed.
    pub count: i64,
    /// Dimension values subdividing the day, empty if none configured.
    pub dimensions: DimensionKey,
}

impl CountRecord {
    /// Creates a new count record.
    #[must_use]
    pub const fn new(day: NaiveDate, count: i64, dimensions: DimensionKey) -> Self {
        Self {
            day,
            count,
            dimensions,
        }
    }

    /// The record's identity key.
    #[must_use]
    pub fn key(&self) -> CountKey {
        (self.day, self.dimensions.clone())
    }
}

/// Source and target counts for one `(day, dimensions)` key.
///
/// Produced by the outer-join merge: exactly one of source-only,
/// target-only, or both-present holds, and the absent side defaults to 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedCount {
    /// The calendar day under comparison.
    pub day: NaiveDate,
    /// Dimension values for this slice.
    pub dimensions: DimensionKey,
    /// Rows observed on the source side (0 if absent).
    pub source_count: i64,
    /// Rows observed on the target side (0 if absent).
    pub target_count: i64,
    /// Whether this slice matches: `source_count <= target_count`.
    pub is_valid: bool,
}

impl MergedCount {
    /// Merges the two sides of one key, zero-filling the absent side.
    #[must_use]
    pub fn from_sides(
        day: NaiveDate,
        dimensions: DimensionKey,
        source: Option<&CountRecord>,
        target: Option<&CountRecord>,
    ) -> Self {
        let source_count = source.map_or(0, |r| r.count);
        let target_count = target.map_or(0, |r| r.count);
        Self {
            day,
            dimensions,
            source_count,
            target_count,
            is_valid: source_count <= target_count,
        }
    }
}

/// The day-level verdict persisted to the audit trail.
///
/// Sums run over every dimension key observed that day; validity is the
/// conjunction of every member's validity. A day where one slice lost rows
/// and another gained them stays invalid even when the sums line up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayVerdict {
    /// The checked day.
    pub day: NaiveDate,
    /// Source rows summed over all dimension keys.
    pub source_count: i64,
    /// Target rows summed over all dimension keys.
    pub target_count: i64,
    /// AND over every member slice's validity.
    pub is_valid: bool,
    /// `target_count - source_count`; negative means the target lost rows.
    pub diff_count: i64,
}

impl DayVerdict {
    /// Starts a verdict from the first merged record of a day.
    #[must_use]
    pub fn from_merged(merged: &MergedCount) -> Self {
        Self {
            day: merged.day,
            source_count: merged.source_count,
            target_count: merged.target_count,
            is_valid: merged.is_valid,
            diff_count: merged.target_count - merged.source_count,
        }
    }

    /// Folds another merged record of the same day into the verdict.
    pub fn absorb(&mut self, merged: &MergedCount) {
        debug_assert_eq!(self.day, merged.day);
        self.source_count += merged.source_count;
        self.target_count += merged.target_count;
        self.is_valid = self.is_valid && merged.is_valid;
        self.diff_count = self.target_count - self.source_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn absent_source_defaults_to_zero_and_is_valid() {
        let target = CountRecord::new(day(), 200, DimensionKey::none());
        let merged = MergedCount::from_sides(day(), DimensionKey::none(), None, Some(&target));
        assert_eq!(merged.source_count, 0);
        assert_eq!(merged.target_count, 200);
        assert!(merged.is_valid);
    }

    #[test]
    fn absent_target_defaults_to_zero_and_is_invalid() {
        let source = CountRecord::new(day(), 150, DimensionKey::none());
        let merged = MergedCount::from_sides(day(), DimensionKey::none(), Some(&source), None);
        assert_eq!(merged.source_count, 150);
        assert_eq!(merged.target_count, 0);
        assert!(!merged.is_valid);
    }

    #[test]
    fn validity_tracks_source_leq_target() {
        let source = CountRecord::new(day(), 100, DimensionKey::none());
        let target = CountRecord::new(day(), 100, DimensionKey::none());
        let merged =
            MergedCount::from_sides(day(), DimensionKey::none(), Some(&source), Some(&target));
        assert!(merged.is_valid);
    }

    #[test]
    fn verdict_absorb_is_conjunctive() {
        let valid = MergedCount {
            day: day(),
            dimensions: DimensionKey::from_pairs([("status", "True")]),
            source_count: 100,
            target_count: 200,
            is_valid: true,
        };
        let invalid = MergedCount {
            day: day(),
            dimensions: DimensionKey::from_pairs([("status", "False")]),
            source_count: 300,
            target_count: 100,
            is_valid: false,
        };

        let mut verdict = DayVerdict::from_merged(&valid);
        verdict.absorb(&invalid);

        assert_eq!(verdict.source_count, 400);
        assert_eq!(verdict.target_count, 300);
        assert_eq!(verdict.diff_count, -100);
        assert!(!verdict.is_valid);
    }
}
