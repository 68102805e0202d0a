//! # tally-store
//!
//! Postgres implementations of the tally collaborators.
//!
//! - [`PgStateStore`]: the durable audit trail (`tally_checks`) and run
//!   table (`tally_runs`), including the atomic RUNNING claim
//! - [`PgCounter`]: day-grain `GROUP BY` row counts from one side, with
//!   optional dimension columns
//! - [`MIGRATOR`]: embedded schema migrations for the state database
//!
//! Queries are bound at runtime (`sqlx::query_as` + `bind`), so building
//! this crate needs no live database.
//!
//! ## Connection handling
//!
//! [`connect`] builds a small pool per database. One reconciliation run
//! opens three: source, target, and the state database (which may be the
//! same server, but is addressed independently).

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod counter;
pub mod ident;
pub mod store;

pub use counter::PgCounter;
pub use store::PgStateStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tally_core::{Error, Result};

/// Embedded migrations for the state database schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Default number of pooled connections per database.
const DEFAULT_POOL_SIZE: u32 = 4;

/// Opens a connection pool for the given database URL.
///
/// # Errors
///
/// Returns [`Error::Store`] when the pool cannot be established.
pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .connect(url)
        .await
        .map_err(|e| Error::store_with_source("failed to connect to database", e))
}

/// Applies any pending state-schema migrations.
///
/// # Errors
///
/// Returns [`Error::Store`] when a migration fails to apply.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| Error::store_with_source("failed to apply state schema migrations", e))?;
    tracing::info!("state schema migrations applied");
    Ok(())
}
