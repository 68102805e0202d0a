//! Backlog planning: which days does this run need to (re-)check.
//!
//! Two mechanisms feed a run's worklist. The forward range walks the
//! cursor from the most recent check (or the epoch, for a fresh pair) up
//! to a safety cutoff that leaves still-loading days alone. The backfill
//! list replays every day whose latest verdict was invalid, so mismatches
//! self-heal once upstream catches up without anyone re-triggering the run.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::ReconcileConfig;

/// The days one run must examine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPlan {
    /// Exclusive lower bound of the forward range.
    pub after: NaiveDate,
    /// Inclusive upper bound of the forward range (`today - safety_lag`).
    pub until: NaiveDate,
    /// Previously-invalid days replayed regardless of the forward range.
    /// Sorted, deduplicated, and disjoint from the forward range.
    pub backfill: Vec<NaiveDate>,
}

impl CheckPlan {
    /// Plans the worklist for a run executing on `today`.
    ///
    /// `cursor` is the day of the pair's most recent check record, if any.
    /// In full-diff mode the forward range restarts at the epoch and the
    /// invalid-day list is dropped; those days already fall inside the
    /// full range.
    #[must_use]
    pub fn build(
        cursor: Option<NaiveDate>,
        invalid_days: Vec<NaiveDate>,
        today: NaiveDate,
        config: &ReconcileConfig,
    ) -> Self {
        let until = today
            .checked_sub_days(Days::new(u64::from(config.safety_lag_days)))
            .unwrap_or(config.epoch);

        let (after, backfill) = if config.full_diff {
            (config.epoch, Vec::new())
        } else {
            let after = cursor.unwrap_or(config.epoch);
            let mut backfill: Vec<NaiveDate> = invalid_days
                .into_iter()
                .filter(|day| *day <= after || *day > until)
                .collect();
            backfill.sort_unstable();
            backfill.dedup();
            (after, backfill)
        };

        Self {
            after,
            until,
            backfill,
        }
    }

    /// True when the forward range covers at least one day.
    #[must_use]
    pub fn has_forward_range(&self) -> bool {
        self.after < self.until
    }

    /// True when the run has nothing to examine.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_forward_range() && self.backfill.is_empty()
    }

    /// Membership test used by in-memory counters and tests; production
    /// counters translate the plan into query predicates instead.
    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        (day > self.after && day <= self.until) || self.backfill.contains(&day)
    }

    /// Every day in the plan, ascending. Intended for diagnostics; the
    /// forward range is expressed to counters by its bounds, not expanded.
    #[must_use]
    pub fn days(&self) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = self.backfill.clone();
        let mut day = self.after;
        while day < self.until {
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
            days.push(day);
        }
        days.sort_unstable();
        days.dedup();
        days
    }
}
