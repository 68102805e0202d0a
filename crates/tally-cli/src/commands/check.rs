//! Check command - run one reconciliation pass.

use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Args;

use tally_core::counter::Side;
use tally_core::{ReconcileConfig, ReconcileOutcome, ReconcileService, TablePair, TableRef};
use tally_store::{PgCounter, PgStateStore};

use crate::OutputFormat;

/// Arguments for the check command.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Source database connection string.
    #[arg(long, env = "TALLY__SOURCE_URL", hide_env_values = true)]
    pub source_url: String,

    /// Target database connection string.
    #[arg(long, env = "TALLY__TARGET_URL", hide_env_values = true)]
    pub target_url: String,

    /// State database connection string.
    #[arg(long, env = "TALLY__STATE_URL", hide_env_values = true)]
    pub state_url: String,

    /// Source database name (pair identity).
    #[arg(long)]
    pub source_database: String,

    /// Source table schema.
    #[arg(long, default_value = "public")]
    pub source_schema: String,

    /// Source table name.
    #[arg(long)]
    pub source_table: String,

    /// Target database name (pair identity).
    #[arg(long)]
    pub target_database: String,

    /// Target table schema.
    #[arg(long, default_value = "public")]
    pub target_schema: String,

    /// Target table name.
    #[arg(long)]
    pub target_table: String,

    /// Dimension columns subdividing each day's comparison
    /// (comma-separated or multiple --dimension flags).
    #[arg(long = "dimension", value_delimiter = ',')]
    pub dimensions: Vec<String>,

    /// Column the day grain is derived from, on both sides.
    #[arg(long, default_value = "created_at")]
    pub date_column: String,

    /// First day ever considered when a pair has no check history.
    #[arg(long, default_value = "2020-01-01")]
    pub epoch: NaiveDate,

    /// Days excluded from the tail of the window while still loading.
    #[arg(long, default_value = "2")]
    pub safety_lag_days: u32,

    /// Recheck the entire history from the epoch, ignoring the cursor.
    #[arg(long)]
    pub full_diff: bool,

    /// Run as of this date instead of today (for replayed invocations).
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

impl CheckArgs {
    fn pair(&self) -> TablePair {
        TablePair::new(
            TableRef::new(&self.source_database, &self.source_schema, &self.source_table),
            TableRef::new(&self.target_database, &self.target_schema, &self.target_table),
        )
    }
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Execute the check command.
///
/// # Errors
///
/// Returns connection errors, collaborator failures, cancellation, and the
/// concurrent-run conflict; the caller maps them to exit codes.
pub async fn execute(args: CheckArgs, format: OutputFormat) -> Result<ReconcileOutcome> {
    let pair = args.pair();
    let config = ReconcileConfig::new(pair.clone())
        .with_epoch(args.epoch)
        .with_safety_lag_days(args.safety_lag_days)
        .with_full_diff(args.full_diff)
        .with_dimension_columns(args.dimensions.clone());

    let source_pool = tally_store::connect(&args.source_url).await?;
    let target_pool = tally_store::connect(&args.target_url).await?;
    let state_pool = tally_store::connect(&args.state_url).await?;

    let source = PgCounter::new(
        source_pool,
        Side::Source,
        pair.source.clone(),
        args.dimensions.clone(),
    )
    .with_date_column(&args.date_column);
    let target = PgCounter::new(
        target_pool,
        Side::Target,
        pair.target.clone(),
        args.dimensions,
    )
    .with_date_column(&args.date_column);

    let service = ReconcileService::new(
        Arc::new(PgStateStore::new(state_pool)),
        Arc::new(source),
        Arc::new(target),
        config,
    );

    let today = args.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let outcome = service.run(today, shutdown_signal()).await?;

    print_outcome(&pair, &outcome, format)?;
    Ok(outcome)
}

fn print_outcome(pair: &TablePair, outcome: &ReconcileOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome)?);
        }
        OutputFormat::Text => {
            println!("Pair:         {pair}");
            println!("Days checked: {}", outcome.days_checked);
            println!("Source total: {}", outcome.source_total);
            println!("Target total: {}", outcome.target_total);
            if outcome.all_valid() {
                println!("Result:       OK");
            } else {
                println!("Result:       INVALID");
                for day in &outcome.invalid_days {
                    println!("  invalid day: {day}");
                }
            }
        }
    }
    Ok(())
}
