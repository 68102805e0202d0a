//! Run records and the run state machine.
//!
//! A run is one execution of the reconciliation engine, tracked in the
//! state store for mutual exclusion. The state machine is deliberately
//! small: `RUNNING` transitions exactly once to a terminal state and
//! terminal states never transition again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::RunId;
use crate::pair::TablePair;

/// Run state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Actively reconciling.
    Running,
    /// Finished; every planned day was examined and persisted.
    Completed,
    /// Aborted by an error or a shutdown signal.
    Failed,
}

impl RunState {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Running => matches!(target, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed => false,
        }
    }

    /// Database/wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunState {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(crate::error::Error::store(format!(
                "unknown run state '{other}'"
            ))),
        }
    }
}

/// A persisted reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Globally unique run identifier.
    pub run_id: RunId,
    /// The pair this run reconciles.
    pub pair: TablePair,
    /// Current state.
    pub status: RunState,
    /// When the run record was created.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// Creates a fresh RUNNING record for a new run.
    #[must_use]
    pub fn begin(pair: TablePair) -> Self {
        let now = Utc::now();
        Self {
            run_id: RunId::generate(),
            pair,
            status: RunState::Running,
            created_at: now,
            updated_at: now,
        }
    }
}
