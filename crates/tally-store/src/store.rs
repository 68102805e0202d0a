//! Postgres state store: the audit trail and the run table.
//!
//! Two fixed tables, provisioned by the embedded migrations:
//!
//! - `tally_checks`: one row per `(pair, day)`, upserted on re-check
//! - `tally_runs`: one row per run; a partial unique index over the pair
//!   columns scoped to `status = 'RUNNING'` backstops the single-flight
//!   invariant at the schema level
//!
//! The RUNNING claim wraps its check-then-insert in a transaction holding
//! a pair-scoped advisory lock, so two processes racing `create_run` are
//! serialized; whichever loses sees the winner's row. Even if an
//! implementation bug let both through, the partial index makes the second
//! insert fail rather than silently succeed.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use tally_core::count::DayVerdict;
use tally_core::id::{CheckId, RunId};
use tally_core::pair::TablePair;
use tally_core::run::{RunRecord, RunState};
use tally_core::store::{CheckRecord, StateStore};
use tally_core::{Error, Result};

/// Derives the advisory-lock key for a pair.
///
/// Postgres advisory locks are keyed by a signed 64-bit integer; the first
/// eight bytes of the pair identity's SHA-256 give a stable, well-spread
/// key.
#[must_use]
pub fn pair_lock_key(pair: &TablePair) -> i64 {
    let digest = Sha256::digest(pair.canonical_string().as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Row shape of `tally_checks`.
#[derive(Debug, sqlx::FromRow)]
struct CheckRow {
    id: Uuid,
    check_date: NaiveDate,
    source_count: i64,
    target_count: i64,
    is_valid: bool,
    diff_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CheckRow {
    fn into_record(self, pair: &TablePair) -> CheckRecord {
        CheckRecord {
            id: CheckId::from_uuid(self.id),
            pair: pair.clone(),
            day: self.check_date,
            source_count: self.source_count,
            target_count: self.target_count,
            is_valid: self.is_valid,
            diff_count: self.diff_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn store_err(message: &str) -> impl FnOnce(sqlx::Error) -> Error + '_ {
    move |e| Error::store_with_source(message.to_string(), e)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Postgres implementation of [`StateStore`].
#[derive(Debug, Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    /// Creates a state store over the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn last_check(&self, pair: &TablePair) -> Result<Option<CheckRecord>> {
        let row: Option<CheckRow> = sqlx::query_as(
            "SELECT id, check_date, source_count, target_count, is_valid, diff_count, \
                    created_at, updated_at \
             FROM tally_checks \
             WHERE source_database = $1 AND source_schema = $2 AND source_table = $3 \
               AND target_database = $4 AND target_schema = $5 AND target_table = $6 \
             ORDER BY check_date DESC \
             LIMIT 1",
        )
        .bind(&pair.source.database)
        .bind(&pair.source.schema)
        .bind(&pair.source.table)
        .bind(&pair.target.database)
        .bind(&pair.target.schema)
        .bind(&pair.target.table)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("failed to load latest check"))?;

        Ok(row.map(|row| row.into_record(pair)))
    }

    async fn invalid_days(&self, pair: &TablePair) -> Result<Vec<NaiveDate>> {
        sqlx::query_scalar(
            "SELECT check_date FROM tally_checks \
             WHERE source_database = $1 AND source_schema = $2 AND source_table = $3 \
               AND target_database = $4 AND target_schema = $5 AND target_table = $6 \
               AND is_valid = FALSE \
             ORDER BY check_date",
        )
        .bind(&pair.source.database)
        .bind(&pair.source.schema)
        .bind(&pair.source.table)
        .bind(&pair.target.database)
        .bind(&pair.target.schema)
        .bind(&pair.target.table)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("failed to load invalid check dates"))
    }

    async fn upsert_checks(&self, pair: &TablePair, verdicts: &[DayVerdict]) -> Result<()> {
        if verdicts.is_empty() {
            tracing::debug!("no verdicts to upsert");
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_err("failed to open upsert transaction"))?;

        for verdict in verdicts {
            let id = CheckId::for_pair_day(pair, verdict.day);
            sqlx::query(
                "INSERT INTO tally_checks \
                     (id, source_database, source_schema, source_table, \
                      target_database, target_schema, target_table, \
                      check_date, source_count, target_count, is_valid, diff_count, \
                      created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), NOW()) \
                 ON CONFLICT (id) DO UPDATE SET \
                     source_count = EXCLUDED.source_count, \
                     target_count = EXCLUDED.target_count, \
                     is_valid = EXCLUDED.is_valid, \
                     diff_count = EXCLUDED.diff_count, \
                     updated_at = NOW()",
            )
            .bind(id.as_uuid())
            .bind(&pair.source.database)
            .bind(&pair.source.schema)
            .bind(&pair.source.table)
            .bind(&pair.target.database)
            .bind(&pair.target.schema)
            .bind(&pair.target.table)
            .bind(verdict.day)
            .bind(verdict.source_count)
            .bind(verdict.target_count)
            .bind(verdict.is_valid)
            .bind(verdict.diff_count)
            .execute(&mut *tx)
            .await
            .map_err(store_err("failed to upsert check record"))?;
        }

        tx.commit()
            .await
            .map_err(store_err("failed to commit check upserts"))?;
        tracing::info!(count = verdicts.len(), "check records upserted");
        Ok(())
    }

    async fn running_runs(&self, pair: &TablePair) -> Result<Vec<RunId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT run_id FROM tally_runs \
             WHERE source_database = $1 AND source_schema = $2 AND source_table = $3 \
               AND target_database = $4 AND target_schema = $5 AND target_table = $6 \
               AND status = 'RUNNING'",
        )
        .bind(&pair.source.database)
        .bind(&pair.source.schema)
        .bind(&pair.source.table)
        .bind(&pair.target.database)
        .bind(&pair.target.schema)
        .bind(&pair.target.table)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("failed to query running runs"))?;

        Ok(ids.into_iter().map(RunId::from_uuid).collect())
    }

    async fn create_run(&self, run: &RunRecord) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_err("failed to open run-claim transaction"))?;

        // Serialize claimants per pair; the lock releases on commit or
        // rollback.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(pair_lock_key(&run.pair))
            .execute(&mut *tx)
            .await
            .map_err(store_err("failed to take pair advisory lock"))?;

        let running: Vec<Uuid> = sqlx::query_scalar(
            "SELECT run_id FROM tally_runs \
             WHERE source_database = $1 AND source_schema = $2 AND source_table = $3 \
               AND target_database = $4 AND target_schema = $5 AND target_table = $6 \
               AND status = 'RUNNING'",
        )
        .bind(&run.pair.source.database)
        .bind(&run.pair.source.schema)
        .bind(&run.pair.source.table)
        .bind(&run.pair.target.database)
        .bind(&run.pair.target.schema)
        .bind(&run.pair.target.table)
        .fetch_all(&mut *tx)
        .await
        .map_err(store_err("failed to check for running runs"))?;

        if !running.is_empty() {
            return Err(Error::ConcurrentRun {
                run_ids: running.into_iter().map(RunId::from_uuid).collect(),
            });
        }

        let insert = sqlx::query(
            "INSERT INTO tally_runs \
                 (run_id, source_database, source_schema, source_table, \
                  target_database, target_schema, target_table, \
                  status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(run.run_id.as_uuid())
        .bind(&run.pair.source.database)
        .bind(&run.pair.source.schema)
        .bind(&run.pair.source.table)
        .bind(&run.pair.target.database)
        .bind(&run.pair.target.schema)
        .bind(&run.pair.target.table)
        .bind(run.status.as_str())
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {}
            // The partial unique index fired: someone else claimed the slot
            // through a path the advisory lock did not cover.
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::ConcurrentRun {
                    run_ids: Vec::new(),
                });
            }
            Err(e) => return Err(Error::store_with_source("failed to insert run record", e)),
        }

        tx.commit()
            .await
            .map_err(store_err("failed to commit run claim"))?;
        Ok(())
    }

    async fn update_run_status(&self, run_id: RunId, status: RunState) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tally_runs SET status = $2, updated_at = NOW() WHERE run_id = $1",
        )
        .bind(run_id.as_uuid())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to update run status"))?;

        if result.rows_affected() == 0 {
            return Err(Error::store(format!("run {run_id} not found")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::pair::TableRef;

    fn pair() -> TablePair {
        TablePair::new(
            TableRef::new("orders_db", "public", "orders"),
            TableRef::new("warehouse", "analytics", "orders"),
        )
    }

    #[test]
    fn lock_key_is_stable_per_pair() {
        assert_eq!(pair_lock_key(&pair()), pair_lock_key(&pair()));
    }

    #[test]
    fn lock_key_distinguishes_pairs() {
        let other = TablePair::new(
            TableRef::new("orders_db", "public", "orders"),
            TableRef::new("warehouse", "analytics", "orders_v2"),
        );
        assert_ne!(pair_lock_key(&pair()), pair_lock_key(&other));
    }
}
