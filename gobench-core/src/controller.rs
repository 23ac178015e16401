//! Convergence controller - play batches until the result can be trusted
//!
//! Level 1 - Orchestration
//!
//! ```text
//! Idle -> Running -> Evaluating -> Running -> ... -> Done
//! ```
//!
//! Each batch is bracketed by crash repair: once before, in case an earlier
//! run was interrupted with crash rows still in the ledger, and once after,
//! for crashes from the batch itself. A ledger that is already converged
//! goes straight from Running to Done without calling the runner.
//!
//! Progress is measured before the second repair, so a batch whose games
//! all crashed still counts as progress. Only a runner that adds no rows
//! at all trips the stall guard.

use crate::config::{BenchConfig, StopRule};
use crate::error::{BenchError, Result};
use crate::ledger::Ledger;
use crate::repair::{CrashRepair, RepairOutcome};
use crate::runner::MatchRunner;
use crate::stats::{win_rate, Summary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Evaluating,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Evaluating => "evaluating",
            Phase::Done => "done",
        }
    }
}

impl StopRule {
    /// Whether enough games have been played
    ///
    /// An absent ledger means work remains. The game count is the number of
    /// decided games, so unresolved rows never count towards convergence.
    pub fn is_done(&self, ledger: Option<&Ledger>) -> bool {
        let Some(ledger) = ledger else {
            return false;
        };

        match win_rate(&ledger.records) {
            Ok(rate) => self.is_converged(rate.games(), rate.margin(self.confidence)),
            Err(_) => false,
        }
    }

    /// Decision given the decided game count and its margin of error
    pub fn is_converged(&self, games: usize, margin: f64) -> bool {
        if games >= self.max_games {
            return true;
        }
        if games < self.min_sample {
            return false;
        }
        margin <= self.error_threshold
    }
}

/// How a run ended
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// Runner invocations made
    pub batches: usize,
    /// Rows in the ledger at the end
    pub games: usize,
    /// Crash rows removed along the way
    pub crashes_removed: usize,
    /// Statistics at the end, if any game was decided
    pub summary: Option<Summary>,
}

/// Drives the runner until the stop rule is satisfied
pub struct ConvergenceController<R: MatchRunner> {
    config: BenchConfig,
    repair: CrashRepair,
    runner: R,
    phase: Phase,
}

impl<R: MatchRunner> ConvergenceController<R> {
    /// Create a controller; the configuration is validated here
    pub fn new(config: BenchConfig, runner: R) -> Result<Self> {
        config.validate()?;
        let repair = CrashRepair::from_config(&config)?;
        Ok(Self {
            config,
            repair,
            runner,
            phase: Phase::Idle,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Run batches until converged
    ///
    /// This function reads like a table of contents:
    /// 1. Stop straight away if the ledger is already converged
    /// 2. Repair, run one batch, repair again
    /// 3. Re-evaluate and loop
    ///
    /// Ledger I/O and parse failures abort the run; nothing is retried
    /// against a ledger that may be half repaired.
    pub fn run(&mut self) -> Result<RunOutcome> {
        let mut outcome = RunOutcome {
            batches: 0,
            games: 0,
            crashes_removed: 0,
            summary: None,
        };

        self.enter(Phase::Running);
        let initial = Ledger::load(self.repair.ledger_path())?;
        if self.config.stop.is_done(initial.as_ref()) {
            tracing::info!("Ledger already converged, nothing to run");
            return Ok(self.finish(outcome, initial));
        }

        let mut stalled = 0;
        loop {
            self.enter(Phase::Running);
            let before = self.repair_pass(&mut outcome)?;
            let current = before.games();
            let target = current + self.config.batch_size;

            tracing::info!(
                "Batch {}: {} games in ledger, requesting {}",
                outcome.batches + 1,
                current,
                target
            );
            self.runner.run_until(target)?;
            outcome.batches += 1;

            let after = self.repair_pass(&mut outcome)?;
            let written = after.games() + after.removed.len();

            self.enter(Phase::Evaluating);
            stalled = self.check_progress(stalled, current, written)?;

            if self.config.stop.is_done(after.ledger.as_ref()) {
                return Ok(self.finish(outcome, after.ledger));
            }

            log_progress(after.ledger.as_ref());
        }
    }

    fn repair_pass(&self, outcome: &mut RunOutcome) -> Result<RepairOutcome> {
        let repaired = self.repair.run()?;
        if !repaired.removed.is_empty() {
            tracing::info!("Removed {} crashed game(s)", repaired.removed.len());
        }
        outcome.crashes_removed += repaired.removed.len();
        Ok(repaired)
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!("Controller {} -> {}", self.phase.as_str(), phase.as_str());
            self.phase = phase;
        }
    }

    /// `written` counts rows the runner left behind, crash rows included
    fn check_progress(&self, stalled: usize, before: usize, written: usize) -> Result<usize> {
        if written > before {
            return Ok(0);
        }

        let stalled = stalled + 1;
        tracing::warn!("Batch made no progress ({} games)", written);

        let limit = self.config.max_stalled_batches;
        if limit > 0 && stalled >= limit {
            return Err(BenchError::Stalled {
                batches: stalled,
                games: written,
            });
        }
        Ok(stalled)
    }

    fn finish(&mut self, mut outcome: RunOutcome, ledger: Option<Ledger>) -> RunOutcome {
        self.enter(Phase::Done);
        if let Some(ledger) = ledger {
            outcome.games = ledger.len();
            outcome.summary = Summary::from_records(&ledger.records).ok();
        }
        outcome
    }
}

fn log_progress(ledger: Option<&Ledger>) {
    let Some(ledger) = ledger else {
        return;
    };
    if let Ok(summary) = Summary::from_records(&ledger.records) {
        tracing::info!("{}", summary.wins_line());
    }
}
