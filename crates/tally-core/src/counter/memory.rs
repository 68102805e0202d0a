//! In-memory counter for tests and development.

use async_trait::async_trait;

use super::{Counter, Side};
use crate::count::CountRecord;
use crate::error::{Error, Result};
use crate::planner::CheckPlan;

/// A counter backed by a fixed set of records.
///
/// `fetch` returns the subset of records whose day falls inside the plan,
/// mimicking a real counter's range predicates. Construct with
/// [`StaticCounter::failing`] to exercise fetch-failure paths.
#[derive(Debug, Clone)]
pub struct StaticCounter {
    side: Side,
    records: Vec<CountRecord>,
    failure: Option<String>,
}

impl StaticCounter {
    /// Creates a counter that serves the given records.
    #[must_use]
    pub fn new(side: Side, records: Vec<CountRecord>) -> Self {
        Self {
            side,
            records,
            failure: None,
        }
    }

    /// Creates a counter whose every fetch fails with the given message.
    #[must_use]
    pub fn failing(side: Side, message: impl Into<String>) -> Self {
        Self {
            side,
            records: Vec::new(),
            failure: Some(message.into()),
        }
    }
}

#[async_trait]
impl Counter for StaticCounter {
    async fn fetch(&self, plan: &CheckPlan) -> Result<Vec<CountRecord>> {
        if let Some(message) = &self.failure {
            return Err(Error::counter(self.side, message.clone()));
        }
        Ok(self
            .records
            .iter()
            .filter(|record| plan.contains(record.day))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcileConfig;
    use crate::dimension::DimensionKey;
    use crate::pair::{TablePair, TableRef};
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn plan() -> CheckPlan {
        let config = ReconcileConfig::new(TablePair::new(
            TableRef::new("db1", "public", "t"),
            TableRef::new("db2", "public", "t"),
        ));
        CheckPlan::build(Some(d(1)), vec![], d(10), &config)
    }

    #[tokio::test]
    async fn serves_only_days_inside_the_plan() {
        let counter = StaticCounter::new(
            Side::Source,
            vec![
                CountRecord::new(d(1), 10, DimensionKey::none()),
                CountRecord::new(d(5), 20, DimensionKey::none()),
                CountRecord::new(d(9), 30, DimensionKey::none()),
            ],
        );
        let records = counter.fetch(&plan()).await.unwrap();
        // Day 1 is the exclusive cursor, day 9 is past the cutoff.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].day, d(5));
    }

    #[tokio::test]
    async fn failing_counter_reports_its_side() {
        let counter = StaticCounter::failing(Side::Target, "connection refused");
        let err = counter.fetch(&plan()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Counter {
                side: Side::Target,
                ..
            }
        ));
    }
}
