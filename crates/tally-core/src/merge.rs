//! Outer-join merge of independently fetched count sequences.

use std::collections::BTreeMap;

use crate::count::{CountKey, CountRecord, MergedCount};
use crate::counter::Side;
use crate::error::{Error, Result};

/// Merges source and target counts into one record per observed key.
///
/// Computes the full outer join over `(day, dimensions)` keys: every key
/// present in either input yields exactly one [`MergedCount`], with the
/// absent side's count zero-filled. Both inputs empty is an empty output,
/// not an error. Output ordering carries no promise; the aggregator does
/// not depend on it.
///
/// # Errors
///
/// Returns [`Error::DuplicateCountKey`] if either input contains two
/// records with the same key, which violates the counter contract.
pub fn merge_counts(
    source: Vec<CountRecord>,
    target: Vec<CountRecord>,
) -> Result<Vec<MergedCount>> {
    let source_by_key = index_side(Side::Source, source)?;
    let target_by_key = index_side(Side::Target, target)?;

    // Union of keys; BTreeMap keeps the scan deterministic.
    let mut keys: BTreeMap<CountKey, ()> = BTreeMap::new();
    keys.extend(source_by_key.keys().cloned().map(|k| (k, ())));
    keys.extend(target_by_key.keys().cloned().map(|k| (k, ())));

    Ok(keys
        .into_keys()
        .map(|(day, dimensions)| {
            let key = (day, dimensions.clone());
            MergedCount::from_sides(
                day,
                dimensions,
                source_by_key.get(&key),
                target_by_key.get(&key),
            )
        })
        .collect())
}

fn index_side(side: Side, records: Vec<CountRecord>) -> Result<BTreeMap<CountKey, CountRecord>> {
    let mut by_key = BTreeMap::new();
    for record in records {
        let key = record.key();
        if let Some(previous) = by_key.insert(key, record) {
            return Err(Error::DuplicateCountKey {
                side,
                day: previous.day,
                dimensions: previous.dimensions,
            });
        }
    }
    Ok(by_key)
}
