//! Day-level aggregation of merged counts.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::count::{DayVerdict, MergedCount};

/// Reduces merged counts into one verdict per day.
///
/// Sums both sides over every dimension key sharing a day and ANDs their
/// validity. Every member is folded, so a single invalid slice marks the
/// whole day invalid even when the aggregate sums would look balanced.
///
/// Deterministic for a given merged set regardless of input order. Days
/// with no merged records simply do not appear.
#[must_use]
pub fn aggregate_days(merged: &[MergedCount]) -> BTreeMap<NaiveDate, DayVerdict> {
    let mut verdicts: BTreeMap<NaiveDate, DayVerdict> = BTreeMap::new();
    for record in merged {
        verdicts
            .entry(record.day)
            .and_modify(|verdict| verdict.absorb(record))
            .or_insert_with(|| DayVerdict::from_merged(record));
    }
    verdicts
}
