//! Error types shared by the ledger, repair and controller layers
//!
//! Level 4 - Utilities and configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BenchError>;

/// Error types for benchmark bookkeeping
///
/// A missing ledger is not an error (see [`crate::Ledger::load`]) and crash
/// rows are repaired rather than reported, so neither appears here.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("malformed record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("I/O failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("insufficient data: no qualifying games for {what}")]
    InsufficientData { what: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("match runner failed: {0}")]
    Runner(String),

    #[error("match runner timed out after {timeout:?}")]
    RunnerTimedOut { timeout: Duration },

    #[error("no progress after {batches} consecutive batches (ledger stuck at {games} games)")]
    Stalled { batches: usize, games: usize },
}

impl BenchError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        BenchError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether the error leaves the ledger in a state that needs manual recovery
    pub fn is_fatal_for_ledger(&self) -> bool {
        matches!(self, BenchError::Io { .. } | BenchError::MalformedRecord { .. })
    }
}
