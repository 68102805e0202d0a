//! In-memory state store for tests and development.
//!
//! Not suitable for production: state is lost on exit and the atomic claim
//! only excludes tasks within the same process. It does reproduce the
//! claim's semantics faithfully (the running-check and insert happen under
//! one lock), so the coordinator's race tests exercise a real contention
//! path.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use super::{CheckRecord, StateStore};
use crate::count::DayVerdict;
use crate::error::{Error, Result};
use crate::id::RunId;
use crate::pair::TablePair;
use crate::run::{RunRecord, RunState};

#[derive(Debug, Default)]
struct Inner {
    /// Check records keyed by (pair identity, day).
    checks: BTreeMap<(String, NaiveDate), CheckRecord>,
    /// Every run ever created, in creation order.
    runs: Vec<RunRecord>,
}

/// In-memory implementation of [`StateStore`].
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    inner: Mutex<Inner>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::store("state store lock poisoned")
}

impl InMemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: every check record currently held for a pair, by day.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn checks_for(&self, pair: &TablePair) -> Result<Vec<CheckRecord>> {
        let inner = self.inner.lock().map_err(poison_err)?;
        let key = pair.canonical_string();
        Ok(inner
            .checks
            .iter()
            .filter(|((pair_key, _), _)| *pair_key == key)
            .map(|(_, record)| record.clone())
            .collect())
    }

    /// Test helper: the full run table in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn runs(&self) -> Result<Vec<RunRecord>> {
        let inner = self.inner.lock().map_err(poison_err)?;
        Ok(inner.runs.clone())
    }

    /// Test helper: seeds a check record directly, bypassing the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn seed_check(&self, record: CheckRecord) -> Result<()> {
        let mut inner = self.inner.lock().map_err(poison_err)?;
        let key = (record.pair.canonical_string(), record.day);
        inner.checks.insert(key, record);
        Ok(())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn last_check(&self, pair: &TablePair) -> Result<Option<CheckRecord>> {
        let inner = self.inner.lock().map_err(poison_err)?;
        let key = pair.canonical_string();
        Ok(inner
            .checks
            .iter()
            .filter(|((pair_key, _), _)| *pair_key == key)
            .map(|(_, record)| record)
            .max_by_key(|record| record.day)
            .cloned())
    }

    async fn invalid_days(&self, pair: &TablePair) -> Result<Vec<NaiveDate>> {
        let inner = self.inner.lock().map_err(poison_err)?;
        let key = pair.canonical_string();
        Ok(inner
            .checks
            .iter()
            .filter(|((pair_key, _), record)| *pair_key == key && !record.is_valid)
            .map(|((_, day), _)| *day)
            .collect())
    }

    async fn upsert_checks(&self, pair: &TablePair, verdicts: &[DayVerdict]) -> Result<()> {
        let mut inner = self.inner.lock().map_err(poison_err)?;
        let pair_key = pair.canonical_string();
        for verdict in verdicts {
            let key = (pair_key.clone(), verdict.day);
            match inner.checks.entry(key) {
                Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    existing.source_count = verdict.source_count;
                    existing.target_count = verdict.target_count;
                    existing.is_valid = verdict.is_valid;
                    existing.diff_count = verdict.diff_count;
                    existing.updated_at = Utc::now();
                }
                Entry::Vacant(entry) => {
                    entry.insert(CheckRecord::from_verdict(pair, verdict));
                }
            }
        }
        Ok(())
    }

    async fn running_runs(&self, pair: &TablePair) -> Result<Vec<RunId>> {
        let inner = self.inner.lock().map_err(poison_err)?;
        Ok(inner
            .runs
            .iter()
            .filter(|run| run.pair == *pair && run.status == RunState::Running)
            .map(|run| run.run_id)
            .collect())
    }

    async fn create_run(&self, run: &RunRecord) -> Result<()> {
        // Check and insert under one lock: this is the atomic claim.
        let mut inner = self.inner.lock().map_err(poison_err)?;
        let conflicting: Vec<RunId> = inner
            .runs
            .iter()
            .filter(|existing| existing.pair == run.pair && existing.status == RunState::Running)
            .map(|existing| existing.run_id)
            .collect();
        if !conflicting.is_empty() {
            return Err(Error::ConcurrentRun {
                run_ids: conflicting,
            });
        }
        inner.runs.push(run.clone());
        Ok(())
    }

    async fn update_run_status(&self, run_id: RunId, status: RunState) -> Result<()> {
        let mut inner = self.inner.lock().map_err(poison_err)?;
        let run = inner
            .runs
            .iter_mut()
            .find(|run| run.run_id == run_id)
            .ok_or_else(|| Error::store(format!("run {run_id} not found")))?;
        run.status = status;
        run.updated_at = Utc::now();
        Ok(())
    }
}
