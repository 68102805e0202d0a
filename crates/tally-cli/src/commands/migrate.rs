//! Migrate command - provision or upgrade the state database schema.

use anyhow::Result;
use clap::Args;

/// Arguments for the migrate command.
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// State database connection string.
    #[arg(long, env = "TALLY__STATE_URL", hide_env_values = true)]
    pub state_url: String,
}

/// Execute the migrate command.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn execute(args: MigrateArgs) -> Result<()> {
    let pool = tally_store::connect(&args.state_url).await?;
    tally_store::migrate(&pool).await?;
    println!("State schema is up to date.");
    Ok(())
}
