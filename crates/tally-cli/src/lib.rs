//! # tally-cli
//!
//! Command-line interface for tally reconciliation.
//!
//! ## Commands
//!
//! - `tally check` - Run one reconciliation pass for a table pair
//! - `tally migrate` - Provision or upgrade the state database schema
//!
//! ## Configuration
//!
//! Connection strings come from flags or environment variables:
//!
//! - `TALLY__SOURCE_URL` - Source database connection string
//! - `TALLY__TARGET_URL` - Target database connection string
//! - `TALLY__STATE_URL` - State (audit trail) database connection string
//!
//! ## Exit codes
//!
//! - `0` - every checked day is valid
//! - `2` - at least one invalid day was found
//! - `3` - a concurrent run held the pair; no check was attempted
//! - `1` - any other failure

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use clap::{Parser, Subcommand};

use tally_core::observability::LogFormat;

/// Tally CLI - day-grain row-count reconciliation.
#[derive(Debug, Parser)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, default_value = "pretty")]
    pub log_format: LogFormatArg,

    /// Result output format.
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one reconciliation pass for a table pair.
    Check(commands::check::CheckArgs),
    /// Provision or upgrade the state database schema.
    Migrate(commands::migrate::MigrateArgs),
}

/// Log format flag.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable logs for terminals.
    #[default]
    Pretty,
    /// JSON structured logs.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// Result output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_parses_pair_and_window_flags() {
        let cli = Cli::parse_from([
            "tally",
            "check",
            "--source-url",
            "postgres://src",
            "--target-url",
            "postgres://tgt",
            "--state-url",
            "postgres://state",
            "--source-database",
            "orders_db",
            "--source-table",
            "orders",
            "--target-database",
            "warehouse",
            "--target-schema",
            "analytics",
            "--target-table",
            "orders",
            "--dimension",
            "status,country",
            "--safety-lag-days",
            "3",
            "--full-diff",
        ]);

        let Commands::Check(args) = cli.command else {
            panic!("expected check subcommand");
        };
        assert_eq!(args.source_database, "orders_db");
        assert_eq!(args.source_schema, "public");
        assert_eq!(args.target_schema, "analytics");
        assert_eq!(args.dimensions, vec!["status", "country"]);
        assert_eq!(args.safety_lag_days, 3);
        assert!(args.full_diff);
        assert!(args.as_of.is_none());
    }

    #[test]
    fn global_format_flags_default() {
        let cli = Cli::parse_from([
            "tally",
            "migrate",
            "--state-url",
            "postgres://state",
        ]);
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(matches!(cli.log_format, LogFormatArg::Pretty));
    }
}
