//! The durable-state collaborator.
//!
//! A [`StateStore`] owns the audit trail (one [`CheckRecord`] per pair and
//! day) and the run table that backs single-flight execution. The engine
//! and coordinator only require the operations below; connectivity,
//! transactions, and timeout policy belong to the implementation.
//!
//! ## The atomic claim
//!
//! [`StateStore::create_run`] is the cross-process exclusion point: it must
//! make the "no RUNNING run exists, insert mine" check-then-insert atomic
//! with respect to other processes. A transactional unique constraint, an
//! advisory lock, or a table lock all qualify; a plain read-then-write has
//! a race window and does not.
//!
//! [`memory::InMemoryStateStore`] backs the test suite; the Postgres
//! implementation lives in `tally-store`.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::count::DayVerdict;
use crate::error::Result;
use crate::id::{CheckId, RunId};
use crate::pair::TablePair;
use crate::run::{RunRecord, RunState};

/// A persisted day-level check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    /// Deterministic identifier derived from pair + day.
    pub id: CheckId,
    /// The pair the check belongs to.
    pub pair: TablePair,
    /// The checked day.
    pub day: NaiveDate,
    /// Source rows summed over all dimension keys.
    pub source_count: i64,
    /// Target rows summed over all dimension keys.
    pub target_count: i64,
    /// The day's verdict.
    pub is_valid: bool,
    /// `target_count - source_count`.
    pub diff_count: i64,
    /// First time this day was checked.
    pub created_at: DateTime<Utc>,
    /// Last time this day was (re-)checked.
    pub updated_at: DateTime<Utc>,
}

impl CheckRecord {
    /// Builds the record for a freshly computed verdict.
    #[must_use]
    pub fn from_verdict(pair: &TablePair, verdict: &DayVerdict) -> Self {
        let now = Utc::now();
        Self {
            id: CheckId::for_pair_day(pair, verdict.day),
            pair: pair.clone(),
            day: verdict.day,
            source_count: verdict.source_count,
            target_count: verdict.target_count,
            is_valid: verdict.is_valid,
            diff_count: verdict.diff_count,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Durable storage for check records and run records.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns the pair's most recent check record (by day), regardless of
    /// validity, or `None` for a pair that has never been checked.
    async fn last_check(&self, pair: &TablePair) -> Result<Option<CheckRecord>>;

    /// Returns every day whose latest verdict for the pair is invalid.
    async fn invalid_days(&self, pair: &TablePair) -> Result<Vec<NaiveDate>>;

    /// Upserts one check record per verdict, keyed by `(pair, day)`.
    ///
    /// Idempotent: re-applying the same verdicts is a no-op side-effect-
    /// wise. Days not present in `verdicts` are never touched.
    async fn upsert_checks(&self, pair: &TablePair, verdicts: &[DayVerdict]) -> Result<()>;

    /// Returns the ids of every RUNNING run for the pair.
    async fn running_runs(&self, pair: &TablePair) -> Result<Vec<RunId>>;

    /// Atomically claims the pair's RUNNING slot by inserting `run`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConcurrentRun`] when a RUNNING record
    /// already exists for the pair; it must not silently succeed.
    async fn create_run(&self, run: &RunRecord) -> Result<()>;

    /// Records a status transition for an existing run.
    async fn update_run_status(&self, run_id: RunId, status: RunState) -> Result<()>;
}
