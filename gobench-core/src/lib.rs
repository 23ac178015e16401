//! gobench core - Benchmark ledger bookkeeping
//!
//! This crate keeps the result ledger of a long series of matches between
//! two Go programs in shape and decides when to stop:
//! - Ledger parsing and crash-safe rewriting
//! - Crash repair with companion file renumbering
//! - Win rate and score agreement statistics
//! - Batch-by-batch convergence control
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: ConvergenceController::run (orchestration)
//! - Level 2: CrashRepair (phases)
//! - Level 3: Ledger, statistics, match runner (steps)
//! - Level 4: companion files, configuration, errors

mod companion;
mod config;
mod controller;
mod error;
mod ledger;
mod repair;
mod runner;
mod stats;

pub use companion::CompanionFiles;
pub use config::{BenchConfig, RunnerConfig, StopRule, DEFAULT_CRASH_SIGNATURE, GAMES_PLACEHOLDER};
pub use controller::{ConvergenceController, Phase, RunOutcome};
pub use error::{BenchError, Result};
pub use ledger::{
    GameRecord, Ledger, COMMENT_MARKER, ERROR_MESSAGE, GAME_ID, MIN_COLUMNS, RESULT_BLACK,
    RESULT_REFEREE, RESULT_WHITE, UNKNOWN_RESULT,
};
pub use repair::{first_crash, is_crash_row, CrashRepair, RepairOutcome};
pub use runner::{MatchRunner, ShellRunner};
pub use stats::{
    margin_of_error, score_agreement, win_rate, z_score, ScoreAgreement, ScoringSummary, Summary,
    WinRate, CONFIDENCE_95, CONFIDENCE_99,
};
