//! Repair command - remove crashed games from a ledger once

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use regex::Regex;

use gobench_core::{CompanionFiles, CrashRepair, DEFAULT_CRASH_SIGNATURE};

#[derive(Args)]
pub struct RepairArgs {
    /// Ledger file to repair
    #[arg(long, value_name = "FILE")]
    pub ledger: PathBuf,

    /// Regex identifying crashed games in the error column
    #[arg(long, default_value = DEFAULT_CRASH_SIGNATURE)]
    pub crash_signature: String,

    /// Extension of per-game companion files
    #[arg(long, default_value = "sgf")]
    pub extension: String,
}

/// Run crash repair to a fixpoint and report what was removed
pub fn run(args: RepairArgs) -> Result<()> {
    let signature = Regex::new(&args.crash_signature)
        .with_context(|| format!("Invalid crash signature: {}", args.crash_signature))?;
    let companions = CompanionFiles::for_ledger(&args.ledger, &args.extension);
    let repair = CrashRepair::new(&args.ledger, companions, signature);

    let outcome = repair
        .run()
        .with_context(|| format!("Failed to repair {}", args.ledger.display()))?;

    match &outcome.ledger {
        None => println!("{}: no ledger yet", args.ledger.display()),
        Some(ledger) if outcome.removed.is_empty() => {
            println!("{}: no crashed games ({} games)", args.ledger.display(), ledger.len());
        }
        Some(ledger) => {
            println!(
                "{}: removed {} crashed game(s) at ids {:?}, {} games remain",
                args.ledger.display(),
                outcome.removed.len(),
                outcome.removed,
                ledger.len()
            );
        }
    }

    Ok(())
}
