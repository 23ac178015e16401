//! gobench CLI - Command-line interface
//!
//! Commands:
//! - run: Play batches until the win rate has converged
//! - repair: Remove crashed games from a ledger
//! - summary: Report win rates for ledger files

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod repair_cmd;
mod run_cmd;
mod summary_cmd;

#[derive(Parser)]
#[command(name = "gobench")]
#[command(about = "Benchmark driver for Go engine matches")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play batches until the result converges
    Run(run_cmd::RunArgs),
    /// Remove crashed games from a ledger
    Repair(repair_cmd::RepairArgs),
    /// Report win rates for ledger files
    Summary(summary_cmd::SummaryArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => run_cmd::run(args),
        Commands::Repair(args) => repair_cmd::run(args),
        Commands::Summary(args) => summary_cmd::run(args),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
