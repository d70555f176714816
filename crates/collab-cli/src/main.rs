//! # collab CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use collab_cli::reconcile::{run_reconcile, ReconcileArgs};
use collab_cli::scan::{run_scan, ScanArgs};
use collab_cli::statuses::{run_statuses, StatusesArgs};

/// Operator tooling for the collaboration workflow.
#[derive(Parser, Debug)]
#[command(name = "collab", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan text for off-platform contact details.
    Scan(ScanArgs),

    /// Print the user-facing label of every status for both viewers.
    Statuses(StatusesArgs),

    /// Compute final terms from a collaboration and a delivered counter.
    Reconcile(ReconcileArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Scan(args) => run_scan(&args),
        Commands::Statuses(args) => run_statuses(&args),
        Commands::Reconcile(args) => run_reconcile(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}
