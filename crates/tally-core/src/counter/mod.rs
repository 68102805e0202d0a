//! The count-fetching collaborator.
//!
//! A [`Counter`] owns one side's database access: given a [`CheckPlan`] it
//! returns one [`CountRecord`] per distinct `(day, dimensions)` key it
//! observed inside the plan. Connectivity, SQL dialect, and any
//! timeout/retry policy live entirely behind this trait; the engine never
//! catches and retries a fetch failure.
//!
//! [`memory::StaticCounter`] backs the test suite; the Postgres
//! implementation lives in `tally-store`.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::count::CountRecord;
use crate::error::Result;
use crate::planner::CheckPlan;

/// Which side of the pair a counter (or its failure) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The side rows originate from.
    Source,
    /// The side rows are loaded into.
    Target,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Target => f.write_str("target"),
        }
    }
}

/// Fetches per-day (per-dimension) row counts from one side.
#[async_trait]
pub trait Counter: Send + Sync {
    /// Returns one record per `(day, dimensions)` key observed within the
    /// plan's forward range or backfill days.
    ///
    /// Implementations must not silently drop keys and must not emit the
    /// same key twice.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Counter`] on connectivity or query failure;
    /// the engine aborts the run without persisting anything.
    async fn fetch(&self, plan: &CheckPlan) -> Result<Vec<CountRecord>>;
}
