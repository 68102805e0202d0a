//! Tally CLI - day-grain row-count reconciliation.
//!
//! The main entry point for the `tally` binary. Maps outcomes to the exit
//! codes the scheduler contract relies on: 0 all valid, 2 invalid diff,
//! 3 concurrent-run conflict, 1 anything else.

use std::process::ExitCode;

use clap::Parser;

use tally_cli::{Cli, Commands};
use tally_core::observability::init_logging;

/// At least one checked day came back invalid.
const EXIT_INVALID_DIFF: u8 = 2;
/// Another run held the pair; no check was attempted.
const EXIT_CONCURRENT_RUN: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format.into());

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        match cli.command {
            Commands::Check(args) => {
                match tally_cli::commands::check::execute(args, cli.format).await {
                    Ok(outcome) if outcome.all_valid() => ExitCode::SUCCESS,
                    Ok(_) => ExitCode::from(EXIT_INVALID_DIFF),
                    Err(error) => exit_for_error(&error),
                }
            }
            Commands::Migrate(args) => {
                match tally_cli::commands::migrate::execute(args).await {
                    Ok(()) => ExitCode::SUCCESS,
                    Err(error) => exit_for_error(&error),
                }
            }
        }
    })
}

fn exit_for_error(error: &anyhow::Error) -> ExitCode {
    eprintln!("Error: {error:#}");
    ExitCode::from(error_code(error))
}

fn error_code(error: &anyhow::Error) -> u8 {
    if error
        .downcast_ref::<tally_core::Error>()
        .is_some_and(tally_core::Error::is_concurrent_run)
    {
        EXIT_CONCURRENT_RUN
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_run_maps_to_its_own_code() {
        let error = anyhow::Error::from(tally_core::Error::ConcurrentRun {
            run_ids: vec![tally_core::RunId::generate()],
        });
        assert_eq!(error_code(&error), EXIT_CONCURRENT_RUN);
    }

    #[test]
    fn other_errors_map_to_generic_failure() {
        let error = anyhow::Error::from(tally_core::Error::store("connection refused"));
        assert_eq!(error_code(&error), 1);
        assert_ne!(EXIT_INVALID_DIFF, EXIT_CONCURRENT_RUN);
    }
}
