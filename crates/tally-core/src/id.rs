//! Strongly-typed identifiers for runs and check records.
//!
//! Run ids are random; check ids are derived deterministically from the
//! table pair and the checked day, so re-checking a day always addresses
//! the same audit row and the store's upsert lands on it.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::pair::TablePair;

/// A unique identifier for a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new unique run ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a run ID from a raw UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s)
            .map(Self)
            .map_err(|e| Error::store(format!("invalid run ID '{s}': {e}")))
    }
}

/// A deterministic identifier for a check record.
///
/// Derived (UUIDv5) from the pair identity and the checked day: the same
/// pair and day always map to the same ID, across processes and runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(Uuid);

impl CheckId {
    /// Derives the check ID for a pair and day.
    #[must_use]
    pub fn for_pair_day(pair: &TablePair, day: NaiveDate) -> Self {
        let name = format!("{}|{day}", pair.canonical_string());
        Self(Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes()))
    }

    /// Creates a check ID from a raw UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::TableRef;

    fn pair() -> TablePair {
        TablePair::new(
            TableRef::new("orders_db", "public", "orders"),
            TableRef::new("warehouse", "analytics", "orders"),
        )
    }

    #[test]
    fn check_id_is_deterministic() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            CheckId::for_pair_day(&pair(), day),
            CheckId::for_pair_day(&pair(), day)
        );
    }

    #[test]
    fn check_id_varies_by_day() {
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_ne!(
            CheckId::for_pair_day(&pair(), d1),
            CheckId::for_pair_day(&pair(), d2)
        );
    }

    #[test]
    fn run_id_round_trips_through_display() {
        let id = RunId::generate();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
