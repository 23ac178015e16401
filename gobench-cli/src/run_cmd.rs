//! Run command - play batches until the win rate converges
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: build_config(), run_controller(), report_results()
//! - Level 3: apply_overrides()
//! - Level 4: formatting utilities

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use gobench_core::{BenchConfig, ConvergenceController, RunOutcome, ShellRunner};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args)]
pub struct RunArgs {
    /// JSON configuration file (flags below override it)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ledger file written by the match runner
    #[arg(long, value_name = "FILE")]
    pub ledger: Option<PathBuf>,

    /// Runner shell command; `{games}` is replaced by the requested total
    #[arg(long)]
    pub command: Option<String>,

    /// Kill the runner after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Games requested per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Decided games required before the margin is trusted
    #[arg(long)]
    pub min_sample: Option<usize>,

    /// Stop after this many decided games
    #[arg(long)]
    pub max_games: Option<usize>,

    /// Stop once the 95% margin of error is at most this many points
    #[arg(long)]
    pub error_threshold: Option<f64>,

    /// Regex identifying crashed games in the error column
    #[arg(long)]
    pub crash_signature: Option<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run the convergence loop
///
/// This function reads like a table of contents:
/// 1. Build the configuration
/// 2. Drive the runner until converged
/// 3. Report results
pub fn run(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    let outcome = run_controller(config)?;

    report_results(&outcome, args.json)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

/// Load the config file (if any), apply flags and validate
fn build_config(args: &RunArgs) -> Result<BenchConfig> {
    let base = match &args.config {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => BenchConfig::default(),
    };

    let config = apply_overrides(base, args);
    config.validate().context("Invalid configuration")?;

    if config.runner.command.is_none() {
        anyhow::bail!("No runner command given (use --command or the config file)");
    }

    Ok(config)
}

fn run_controller(config: BenchConfig) -> Result<RunOutcome> {
    let runner = ShellRunner::from_config(&config.runner)?;
    let mut controller = ConvergenceController::new(config, runner)?;

    let config = controller.config();
    let ledger = config.ledger.clone();
    tracing::info!(
        "Starting benchmark: ledger={}, batch={}, min={}, max={}, threshold={}",
        ledger.display(),
        config.batch_size,
        config.stop.min_sample,
        config.stop.max_games,
        config.stop.error_threshold
    );

    controller.run().map_err(|e| {
        if e.is_fatal_for_ledger() {
            tracing::error!(
                "{} may need manual recovery; look for timestamped backups next to it",
                ledger.display()
            );
        }
        anyhow::Error::new(e).context(format!("Benchmark aborted on {}", ledger.display()))
    })
}

fn report_results(outcome: &RunOutcome, json: bool) -> Result<()> {
    if json {
        print_json_results(outcome)
    } else {
        print_text_results(outcome);
        Ok(())
    }
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

fn apply_overrides(mut config: BenchConfig, args: &RunArgs) -> BenchConfig {
    if let Some(ledger) = &args.ledger {
        config.ledger = ledger.clone();
    }
    if let Some(command) = &args.command {
        config.runner.command = Some(command.clone());
    }
    if let Some(timeout) = args.timeout {
        config.runner.timeout_secs = Some(timeout);
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(min_sample) = args.min_sample {
        config.stop.min_sample = min_sample;
    }
    if let Some(max_games) = args.max_games {
        config.stop.max_games = max_games;
    }
    if let Some(threshold) = args.error_threshold {
        config.stop.error_threshold = threshold;
    }
    if let Some(signature) = &args.crash_signature {
        config.crash_signature = signature.clone();
    }
    config
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

fn print_json_results(outcome: &RunOutcome) -> Result<()> {
    #[derive(serde::Serialize)]
    struct JsonOutput<'a> {
        batches: usize,
        games: usize,
        crashes_removed: usize,
        summary: Option<&'a gobench_core::Summary>,
    }

    let output = JsonOutput {
        batches: outcome.batches,
        games: outcome.games,
        crashes_removed: outcome.crashes_removed,
        summary: outcome.summary.as_ref(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_text_results(outcome: &RunOutcome) {
    println!("\n=== Benchmark Finished ===");
    println!("Batches run:     {}", outcome.batches);
    println!("Games in ledger: {}", outcome.games);
    println!("Crashes removed: {}", outcome.crashes_removed);

    match &outcome.summary {
        Some(summary) => {
            println!("{}", summary.wins_line());
            if let Some(line) = summary.scoring_line() {
                println!("{}", line);
            }
        }
        None => println!("No decided games"),
    }
}

// ============================================================================
// TESTS
// ============================================================================
