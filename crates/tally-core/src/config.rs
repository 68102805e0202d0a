//! Run configuration.
//!
//! One [`ReconcileConfig`] is built at process start and passed by value
//! into the service constructors. There is no ambient global configuration.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::pair::TablePair;

/// Default safety lag: days newer than `today - 2` are still loading and
/// are not compared yet.
pub const DEFAULT_SAFETY_LAG_DAYS: u32 = 2;

/// Default epoch start date used when a pair has no check history.
#[must_use]
pub fn default_epoch() -> NaiveDate {
    // Checked construction of a constant date.
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}

/// Settings for one reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileConfig {
    /// The table pair under reconciliation.
    pub pair: TablePair,
    /// First day ever considered for this pair; the forward range starts
    /// here when no check history exists (and always, in full-diff mode).
    pub epoch: NaiveDate,
    /// Days excluded from the tail of the forward range while they may
    /// still be loading.
    pub safety_lag_days: u32,
    /// When set, the forward range spans the entire history from the epoch
    /// and the last-check cursor is ignored.
    pub full_diff: bool,
    /// Dimension columns subdividing each day's comparison; empty for a
    /// plain per-day count.
    pub dimension_columns: Vec<String>,
}

impl ReconcileConfig {
    /// Creates a configuration with default epoch and safety lag.
    #[must_use]
    pub fn new(pair: TablePair) -> Self {
        Self {
            pair,
            epoch: default_epoch(),
            safety_lag_days: DEFAULT_SAFETY_LAG_DAYS,
            full_diff: false,
            dimension_columns: Vec::new(),
        }
    }

    /// Sets the epoch start date.
    #[must_use]
    pub const fn with_epoch(mut self, epoch: NaiveDate) -> Self {
        self.epoch = epoch;
        self
    }

    /// Sets the safety lag in days.
    #[must_use]
    pub const fn with_safety_lag_days(mut self, days: u32) -> Self {
        self.safety_lag_days = days;
        self
    }

    /// Enables or disables full-diff mode.
    #[must_use]
    pub const fn with_full_diff(mut self, full_diff: bool) -> Self {
        self.full_diff = full_diff;
        self
    }

    /// Sets the dimension columns.
    #[must_use]
    pub fn with_dimension_columns(mut self, columns: Vec<String>) -> Self {
        self.dimension_columns = columns;
        self
    }
}
