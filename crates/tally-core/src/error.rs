//! Error types and result alias for the reconciliation domain.
//!
//! Two situations deliberately do **not** appear here: an invalid diff is a
//! result, not a fault (see [`crate::engine::ReconcileOutcome`]), and
//! transient collaborator failures are never retried by the core; retries
//! belong to the external scheduler that invokes the CLI.

use chrono::NaiveDate;

use crate::counter::Side;
use crate::dimension::DimensionKey;
use crate::id::RunId;
use crate::run::RunState;

/// The result type used throughout tally.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a reconciliation run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Another run is already RUNNING for this table pair.
    ///
    /// Non-retryable within the same invocation; the caller should exit and
    /// let the next scheduled invocation try again.
    #[error("concurrent reconciliation run(s) already RUNNING: {run_ids:?}")]
    ConcurrentRun {
        /// Identifiers of the conflicting runs.
        run_ids: Vec<RunId>,
    },

    /// A counter returned two records with the same `(day, dimensions)` key.
    ///
    /// This violates the [`crate::counter::Counter`] contract and indicates
    /// a collaborator bug or misconfiguration, not a data mismatch.
    #[error("duplicate {side} count key: day {day}, dimensions [{dimensions}]")]
    DuplicateCountKey {
        /// Which side produced the duplicate.
        side: Side,
        /// The duplicated day.
        day: NaiveDate,
        /// The duplicated dimension values.
        dimensions: DimensionKey,
    },

    /// An invalid run state transition was attempted.
    #[error("invalid run state transition: {from} -> {to}")]
    InvalidTransition {
        /// The current state.
        from: RunState,
        /// The attempted target state.
        to: RunState,
    },

    /// A state store operation failed.
    #[error("state store error: {message}")]
    Store {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A counter fetch failed.
    #[error("{side} counter error: {message}")]
    Counter {
        /// Which side failed.
        side: Side,
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An operator-supplied identifier (schema, table, column) is not safe
    /// to interpolate into a query.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The run was interrupted by a shutdown signal before finishing.
    #[error("run cancelled by shutdown signal")]
    Cancelled,
}

impl Error {
    /// Creates a new store error with the given message.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new store error with a source cause.
    #[must_use]
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new counter error for the given side.
    #[must_use]
    pub fn counter(side: Side, message: impl Into<String>) -> Self {
        Self::Counter {
            side,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new counter error with a source cause.
    #[must_use]
    pub fn counter_with_source(
        side: Side,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Counter {
            side,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true for the concurrent-run conflict signal.
    #[must_use]
    pub const fn is_concurrent_run(&self) -> bool {
        matches!(self, Self::ConcurrentRun { .. })
    }
}
