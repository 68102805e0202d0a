//! The run driver: coordination wrapped around the engine.
//!
//! [`ReconcileService::run`] is the one entry point callers use. It claims
//! the pair's RUNNING slot, races the engine against a caller-supplied
//! shutdown future, and guarantees the run record leaves RUNNING on every
//! path a handler can catch: success completes it, an error or a shutdown
//! signal fails it before the error propagates.

use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::ReconcileConfig;
use crate::coordinator::RunCoordinator;
use crate::counter::Counter;
use crate::engine::{ReconcileOutcome, ReconciliationEngine};
use crate::error::{Error, Result};
use crate::pair::TablePair;
use crate::store::StateStore;

/// Ties the coordinator and the engine together for one invocation.
pub struct ReconcileService {
    store: Arc<dyn StateStore>,
    engine: ReconciliationEngine,
    pair: TablePair,
}

impl std::fmt::Debug for ReconcileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileService")
            .field("pair", &self.pair)
            .finish_non_exhaustive()
    }
}

impl ReconcileService {
    /// Creates the service over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStore>,
        source: Arc<dyn Counter>,
        target: Arc<dyn Counter>,
        config: ReconcileConfig,
    ) -> Self {
        let pair = config.pair.clone();
        let engine = ReconciliationEngine::new(store.clone(), source, target, config);
        Self {
            store,
            engine,
            pair,
        }
    }

    /// Runs one reconciliation under single-flight coordination.
    ///
    /// `shutdown` resolves when the process should stop (the CLI wires
    /// SIGINT/SIGTERM into it). On shutdown the run is marked FAILED and
    /// [`Error::Cancelled`] is returned; no further state is touched.
    ///
    /// # Errors
    ///
    /// [`Error::ConcurrentRun`] when another run holds the slot (nothing
    /// was created); [`Error::Cancelled`] on shutdown; otherwise the
    /// engine's error after the run is marked FAILED best-effort.
    pub async fn run(
        &self,
        today: NaiveDate,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<ReconcileOutcome> {
        let coordinator = RunCoordinator::start(self.store.clone(), self.pair.clone()).await?;

        let result = tokio::select! {
            result = self.engine.execute_as_of(today) => result,
            () = shutdown => {
                tracing::warn!(run_id = %coordinator.run_id(), "shutdown signal received, aborting run");
                Err(Error::Cancelled)
            }
        };

        match result {
            Ok(outcome) => {
                coordinator.complete().await?;
                Ok(outcome)
            }
            Err(error) => {
                coordinator.fail_best_effort().await;
                Err(error)
            }
        }
    }
}
