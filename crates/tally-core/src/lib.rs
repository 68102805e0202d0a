//! # tally-core
//!
//! Day-grain row-count reconciliation between a source table and a target
//! table that should stay in sync.
//!
//! This crate implements the reconciliation domain, providing:
//!
//! - **Backlog planning**: Which days need (re-)checking this run
//! - **Dimensional merge**: Outer-join of per-day, per-dimension counts
//!   fetched independently from both sides
//! - **Day aggregation**: One verdict per day, with dimension-level
//!   failures never masked by aggregate sums
//! - **Run coordination**: Single-flight execution per table pair with
//!   crash-safe run-state transitions
//!
//! ## Core Concepts
//!
//! - **Pair**: The `(source table, target table)` relationship under
//!   reconciliation
//! - **Day**: The calendar-date grain at which counts are compared
//! - **Dimension**: An optional extra grouping column (status, country, ...)
//!   that subdivides a day's comparison
//! - **Run**: One execution of the engine, tracked for mutual exclusion
//!
//! ## Collaborators
//!
//! Database connectivity lives behind two traits: [`Counter`] fetches
//! per-day counts from one side, and [`StateStore`] owns the durable audit
//! trail (check records) and the run table. In-memory implementations back
//! the test suite; Postgres implementations live in `tally-store`.
//!
//! ## Guarantees
//!
//! - **Deterministic**: The same fetched counts always produce the same
//!   verdicts, regardless of input order
//! - **Self-healing**: Days with an invalid verdict are re-examined on
//!   every subsequent run until they match
//! - **Single-flight**: At most one RUNNING run per pair, enforced by an
//!   atomic claim in the state store
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use tally_core::count::CountRecord;
//! use tally_core::dimension::DimensionKey;
//! use tally_core::error::Result;
//! use tally_core::{aggregate_days, merge_counts};
//!
//! # fn main() -> Result<()> {
//! let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let source = vec![CountRecord::new(day, 100, DimensionKey::none())];
//! let target = vec![CountRecord::new(day, 200, DimensionKey::none())];
//!
//! let merged = merge_counts(source, target)?;
//! let verdicts = aggregate_days(&merged);
//!
//! assert!(verdicts[&day].is_valid);
//! assert_eq!(verdicts[&day].diff_count, 100);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod aggregate;
pub mod config;
pub mod coordinator;
pub mod count;
pub mod counter;
pub mod dimension;
pub mod engine;
pub mod error;
pub mod id;
pub mod merge;
pub mod observability;
pub mod pair;
pub mod planner;
pub mod run;
pub mod service;
pub mod store;

pub use aggregate::aggregate_days;
pub use config::ReconcileConfig;
pub use coordinator::RunCoordinator;
pub use count::{CountRecord, DayVerdict, MergedCount};
pub use counter::{Counter, Side};
pub use dimension::DimensionKey;
pub use engine::{ReconcileOutcome, ReconciliationEngine};
pub use error::{Error, Result};
pub use id::{CheckId, RunId};
pub use merge::merge_counts;
pub use pair::{TablePair, TableRef};
pub use planner::CheckPlan;
pub use run::{RunRecord, RunState};
pub use service::ReconcileService;
pub use store::{CheckRecord, StateStore};
