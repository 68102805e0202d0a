//! Single-flight run coordination.
//!
//! The coordinator owns one run record's lifecycle: it claims the pair's
//! RUNNING slot at start and performs the single transition out of it.
//! Terminal states are sticky: a `complete()`/`fail()` shutdown race or a
//! repeated `fail()` results in exactly one status write.
//!
//! A crashed process that never reached `fail()` (SIGKILL, power loss)
//! leaves a stale RUNNING row that wedges the pair until an operator
//! clears it. That gap is known and deliberately not papered over here;
//! the shutdown path in [`crate::service`] covers every signal a handler
//! can catch.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::id::RunId;
use crate::pair::TablePair;
use crate::run::{RunRecord, RunState};
use crate::store::StateStore;

/// Coordinates one reconciliation run's state transitions.
pub struct RunCoordinator {
    store: Arc<dyn StateStore>,
    record: RunRecord,
    state: Mutex<RunState>,
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("run_id", &self.record.run_id)
            .field("pair", &self.record.pair)
            .finish_non_exhaustive()
    }
}

impl RunCoordinator {
    /// Claims the RUNNING slot for `pair` and creates this run's record.
    ///
    /// Queries the store for existing RUNNING runs first so the conflict
    /// error can name them; the store's own atomic claim in
    /// [`StateStore::create_run`] closes the remaining race window, so a
    /// concurrent winner still surfaces as [`Error::ConcurrentRun`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConcurrentRun`] when another run holds the slot
    /// (no record is created), or a store error.
    pub async fn start(store: Arc<dyn StateStore>, pair: TablePair) -> Result<Self> {
        let running = store.running_runs(&pair).await?;
        if !running.is_empty() {
            return Err(Error::ConcurrentRun { run_ids: running });
        }

        let record = RunRecord::begin(pair);
        store.create_run(&record).await?;
        tracing::info!(run_id = %record.run_id, pair = %record.pair, "reconciliation run started");

        Ok(Self {
            store,
            record,
            state: Mutex::new(RunState::Running),
        })
    }

    /// This run's identifier.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.record.run_id
    }

    /// Marks the run COMPLETED.
    ///
    /// # Errors
    ///
    /// Returns a store error if the status write fails.
    pub async fn complete(&self) -> Result<()> {
        self.transition(RunState::Completed).await
    }

    /// Marks the run FAILED.
    ///
    /// Idempotent: only the first terminal transition writes; later calls
    /// (shutdown races, double signal delivery) are no-ops.
    ///
    /// # Errors
    ///
    /// Returns a store error if the status write fails.
    pub async fn fail(&self) -> Result<()> {
        self.transition(RunState::Failed).await
    }

    /// Marks the run FAILED, swallowing (but logging) store errors.
    ///
    /// Used on error and cancellation paths where the original failure
    /// must stay the one the caller sees.
    pub async fn fail_best_effort(&self) {
        if let Err(error) = self.fail().await {
            tracing::error!(
                run_id = %self.record.run_id,
                %error,
                "failed to record FAILED status for run"
            );
        }
    }

    async fn transition(&self, to: RunState) -> Result<()> {
        // The lock is held across the store write so concurrent transitions
        // serialize and exactly one of them performs the write.
        let mut state = self.state.lock().await;
        if state.is_terminal() {
            tracing::debug!(
                run_id = %self.record.run_id,
                current = %*state,
                requested = %to,
                "run already terminal, skipping transition"
            );
            return Ok(());
        }
        if !state.can_transition_to(to) {
            return Err(Error::InvalidTransition { from: *state, to });
        }

        self.store
            .update_run_status(self.record.run_id, to)
            .await?;
        *state = to;
        tracing::info!(run_id = %self.record.run_id, status = %to, "run status recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::TableRef;
    use crate::store::memory::InMemoryStateStore;

    fn pair() -> TablePair {
        TablePair::new(
            TableRef::new("db1", "public", "orders"),
            TableRef::new("db2", "public", "orders"),
        )
    }

    #[tokio::test]
    async fn start_then_complete_round_trips() {
        let store = Arc::new(InMemoryStateStore::new());
        let coordinator = RunCoordinator::start(store.clone(), pair()).await.unwrap();
        coordinator.complete().await.unwrap();

        let runs = store.runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunState::Completed);
    }

    #[tokio::test]
    async fn start_refuses_while_another_run_is_running() {
        let store = Arc::new(InMemoryStateStore::new());
        let first = RunCoordinator::start(store.clone(), pair()).await.unwrap();

        let err = RunCoordinator::start(store.clone(), pair())
            .await
            .unwrap_err();
        match err {
            Error::ConcurrentRun { run_ids } => assert_eq!(run_ids, vec![first.run_id()]),
            other => panic!("expected ConcurrentRun, got {other}"),
        }
        // The loser must not have created a record.
        assert_eq!(store.runs().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fail_twice_writes_once() {
        let store = Arc::new(InMemoryStateStore::new());
        let coordinator = RunCoordinator::start(store.clone(), pair()).await.unwrap();

        coordinator.fail().await.unwrap();
        let after_first = store.runs().unwrap()[0].updated_at;

        coordinator.fail().await.unwrap();
        let after_second = store.runs().unwrap()[0].updated_at;

        assert_eq!(store.runs().unwrap()[0].status, RunState::Failed);
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn complete_after_fail_is_a_noop() {
        let store = Arc::new(InMemoryStateStore::new());
        let coordinator = RunCoordinator::start(store.clone(), pair()).await.unwrap();

        coordinator.fail().await.unwrap();
        coordinator.complete().await.unwrap();

        assert_eq!(store.runs().unwrap()[0].status, RunState::Failed);
    }
}
