//! Configuration types for benchmark runs
//!
//! Level 4 - Utilities and configuration

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::stats::CONFIDENCE_95;

/// Placeholder in the runner command replaced by the requested total game count
pub const GAMES_PLACEHOLDER: &str = "{games}";

/// Message GNU Go leaves in the error column when it dies mid-game
pub const DEFAULT_CRASH_SIGNATURE: &str = "The Go program terminated unexpectedly";

/// How the external match runner is launched
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Shell command; must contain `{games}`
    pub command: Option<String>,
    /// Kill the runner after this many seconds (None = wait forever)
    pub timeout_secs: Option<u64>,
}

/// When a run is considered converged
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopRule {
    /// Decided games needed before the margin of error is trusted
    pub min_sample: usize,
    /// Hard cap on decided games
    pub max_games: usize,
    /// Largest acceptable margin of error, in percentage points
    pub error_threshold: f64,
    /// Confidence level for the margin check
    pub confidence: f64,
}

impl Default for StopRule {
    fn default() -> Self {
        Self {
            min_sample: 100,
            max_games: 1000,
            error_threshold: 3.0,
            confidence: CONFIDENCE_95,
        }
    }
}

impl StopRule {
    pub fn new(min_sample: usize, max_games: usize, error_threshold: f64) -> Self {
        Self {
            min_sample,
            max_games,
            error_threshold,
            ..Default::default()
        }
    }
}

/// Complete configuration for a benchmark run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Ledger written by the match runner
    pub ledger: PathBuf,
    /// Extension of per-game companion files
    pub companion_extension: String,
    /// Regex matched against the error column of unresolved rows
    pub crash_signature: String,
    /// Games requested per runner invocation
    pub batch_size: usize,
    pub stop: StopRule,
    /// Consecutive batches without ledger growth before giving up (0 = never)
    pub max_stalled_batches: usize,
    pub runner: RunnerConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            ledger: PathBuf::from("benchmark.dat"),
            companion_extension: "sgf".to_string(),
            crash_signature: DEFAULT_CRASH_SIGNATURE.to_string(),
            batch_size: 10,
            stop: StopRule::default(),
            max_stalled_batches: 3,
            runner: RunnerConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| BenchError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    /// Set ledger path
    pub fn with_ledger(mut self, ledger: impl Into<PathBuf>) -> Self {
        self.ledger = ledger.into();
        self
    }

    /// Set crash signature pattern
    pub fn with_crash_signature(mut self, pattern: impl Into<String>) -> Self {
        self.crash_signature = pattern.into();
        self
    }

    /// Set stop rule
    pub fn with_stop_rule(mut self, stop: StopRule) -> Self {
        self.stop = stop;
        self
    }

    /// Set runner command
    pub fn with_runner_command(mut self, command: impl Into<String>) -> Self {
        self.runner.command = Some(command.into());
        self
    }

    /// Compile the crash signature
    pub fn crash_regex(&self) -> Result<Regex> {
        Regex::new(&self.crash_signature).map_err(|e| {
            BenchError::InvalidConfig(format!("crash signature {:?}: {}", self.crash_signature, e))
        })
    }

    /// Reject values the controller cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.stop.max_games == 0 {
            return Err(invalid("max_games must be at least 1"));
        }
        if self.stop.min_sample > self.stop.max_games {
            return Err(invalid(format!(
                "min_sample ({}) exceeds max_games ({})",
                self.stop.min_sample, self.stop.max_games
            )));
        }
        if !(self.stop.confidence > 0.0 && self.stop.confidence < 1.0) {
            return Err(invalid(format!(
                "confidence must be in (0, 1), got {}",
                self.stop.confidence
            )));
        }
        if !(self.stop.error_threshold > 0.0) {
            return Err(invalid(format!(
                "error_threshold must be positive, got {}",
                self.stop.error_threshold
            )));
        }
        if let Some(command) = &self.runner.command {
            if !command.contains(GAMES_PLACEHOLDER) {
                return Err(invalid(format!(
                    "runner command must contain {}",
                    GAMES_PLACEHOLDER
                )));
            }
        }
        self.crash_regex()?;
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> BenchError {
    BenchError::InvalidConfig(msg.into())
}
