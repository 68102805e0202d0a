//! The reconciliation engine.
//!
//! One `execute` call is one run's worth of work: plan the backlog, fetch
//! both sides concurrently, merge and aggregate, persist every verdict,
//! and report. The engine holds no cross-run state; mutual exclusion is
//! the coordinator's job.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::aggregate_days;
use crate::config::ReconcileConfig;
use crate::count::MergedCount;
use crate::counter::Counter;
use crate::error::Result;
use crate::merge::merge_counts;
use crate::planner::CheckPlan;
use crate::store::StateStore;

/// What one run observed and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// Number of days that produced a verdict this run.
    pub days_checked: usize,
    /// Days whose verdict is invalid, ascending.
    pub invalid_days: Vec<NaiveDate>,
    /// Source rows summed over every checked day.
    pub source_total: i64,
    /// Target rows summed over every checked day.
    pub target_total: i64,
}

impl ReconcileOutcome {
    /// True iff every day checked this run is valid.
    ///
    /// An empty run (nothing to check) is vacuously valid.
    #[must_use]
    pub fn all_valid(&self) -> bool {
        self.invalid_days.is_empty()
    }

    const fn empty() -> Self {
        Self {
            days_checked: 0,
            invalid_days: Vec::new(),
            source_total: 0,
            target_total: 0,
        }
    }
}

/// Merges and aggregates counts fetched from the two sides of a pair.
pub struct ReconciliationEngine {
    store: Arc<dyn StateStore>,
    source: Arc<dyn Counter>,
    target: Arc<dyn Counter>,
    config: ReconcileConfig,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("pair", &self.config.pair)
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    /// Creates an engine over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStore>,
        source: Arc<dyn Counter>,
        target: Arc<dyn Counter>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            store,
            source,
            target,
            config,
        }
    }

    /// Runs one reconciliation pass as of the current date.
    ///
    /// # Errors
    ///
    /// Propagates collaborator failures unchanged; nothing from this run
    /// is persisted when either fetch fails.
    pub async fn execute(&self) -> Result<ReconcileOutcome> {
        self.execute_as_of(Utc::now().date_naive()).await
    }

    /// Runs one reconciliation pass with an explicit "today".
    ///
    /// Schedulers that re-run historical invocations (and tests) pin the
    /// date here; `execute` is the everyday entry point.
    ///
    /// # Errors
    ///
    /// Propagates collaborator failures unchanged.
    pub async fn execute_as_of(&self, today: NaiveDate) -> Result<ReconcileOutcome> {
        let pair = &self.config.pair;
        tracing::info!(%pair, %today, "starting reconciliation");

        let cursor = self.store.last_check(pair).await?.map(|check| check.day);
        let invalid_days = self.store.invalid_days(pair).await?;
        tracing::info!(
            ?cursor,
            invalid_days = invalid_days.len(),
            full_diff = self.config.full_diff,
            "backlog inputs loaded"
        );

        let plan = CheckPlan::build(cursor, invalid_days, today, &self.config);
        if plan.is_empty() {
            tracing::info!(%pair, "nothing to check, all caught up");
            return Ok(ReconcileOutcome::empty());
        }
        tracing::debug!(
            after = %plan.after,
            until = %plan.until,
            backfill = plan.backfill.len(),
            "check plan built"
        );

        // The run's only fan-out: both sides fetch concurrently and are
        // joined before anything else happens. Either failure aborts the
        // run before any verdict is persisted.
        let (source_counts, target_counts) =
            tokio::try_join!(self.source.fetch(&plan), self.target.fetch(&plan))?;
        tracing::info!(
            source_keys = source_counts.len(),
            target_keys = target_counts.len(),
            "counts fetched"
        );

        let merged = merge_counts(source_counts, target_counts)?;
        let verdicts = aggregate_days(&merged);

        let verdict_list: Vec<_> = verdicts.values().cloned().collect();
        self.store.upsert_checks(pair, &verdict_list).await?;

        let mut invalid_days = Vec::new();
        let mut source_total = 0_i64;
        let mut target_total = 0_i64;
        for verdict in verdicts.values() {
            source_total += verdict.source_count;
            target_total += verdict.target_count;
            if !verdict.is_valid {
                report_invalid_day(verdict.day, verdict.source_count, verdict.target_count, &merged);
                invalid_days.push(verdict.day);
            }
        }

        let outcome = ReconcileOutcome {
            days_checked: verdicts.len(),
            invalid_days,
            source_total,
            target_total,
        };
        tracing::info!(
            days_checked = outcome.days_checked,
            invalid_days = outcome.invalid_days.len(),
            all_valid = outcome.all_valid(),
            "reconciliation finished"
        );
        Ok(outcome)
    }
}

/// Logs one invalid day, enumerating every invalid dimension key under it.
fn report_invalid_day(day: NaiveDate, source_count: i64, target_count: i64, merged: &[MergedCount]) {
    tracing::warn!(
        %day,
        source_count,
        target_count,
        diff = target_count - source_count,
        "invalid diff detected"
    );
    for slice in merged
        .iter()
        .filter(|slice| slice.day == day && !slice.is_valid)
    {
        tracing::warn!(
            %day,
            dimensions = %slice.dimensions,
            source_count = slice.source_count,
            target_count = slice.target_count,
            "invalid dimension slice"
        );
    }
}
