//! Crash repair - drop games a participant crashed out of
//!
//! Level 2 - Phases
//!
//! Removing a row shifts every later id down by one, so after each removal
//! the ledger is scanned again from the start until no crash row is left.
//! Companion files are renamed in step so `<base>-<id>` always belongs to
//! the record currently holding `id`.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::companion::CompanionFiles;
use crate::config::BenchConfig;
use crate::error::Result;
use crate::ledger::{GameRecord, Ledger, UNKNOWN_RESULT};

/// Whether `record` is a game lost to a known participant crash
pub fn is_crash_row(record: &GameRecord, signature: &Regex) -> bool {
    record.result_referee() == UNKNOWN_RESULT
        && record
            .error_message()
            .map_or(false, |msg| signature.is_match(msg))
}

/// Lowest id among crash rows
pub fn first_crash(records: &[GameRecord], signature: &Regex) -> Option<u32> {
    first_crash_position(records, signature).map(|i| records[i].id)
}

/// Position of the crash row with the lowest id
fn first_crash_position(records: &[GameRecord], signature: &Regex) -> Option<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| is_crash_row(r, signature))
        .min_by_key(|(_, r)| r.id)
        .map(|(i, _)| i)
}

/// What a repair pass did
#[derive(Clone, Debug, Default)]
pub struct RepairOutcome {
    /// Ledger after repair (None if no file exists)
    pub ledger: Option<Ledger>,
    /// Id of each removed row at the moment it was removed
    pub removed: Vec<u32>,
}

impl RepairOutcome {
    /// Rows currently in the ledger
    pub fn games(&self) -> usize {
        self.ledger.as_ref().map_or(0, Ledger::len)
    }
}

/// Removes crash rows from a ledger on disk
pub struct CrashRepair {
    ledger_path: PathBuf,
    companions: CompanionFiles,
    signature: Regex,
}

impl CrashRepair {
    pub fn new(ledger_path: impl Into<PathBuf>, companions: CompanionFiles, signature: Regex) -> Self {
        Self {
            ledger_path: ledger_path.into(),
            companions,
            signature,
        }
    }

    /// Build from configuration
    pub fn from_config(config: &BenchConfig) -> Result<Self> {
        let companions = CompanionFiles::for_ledger(&config.ledger, &config.companion_extension);
        Ok(Self::new(config.ledger.clone(), companions, config.crash_regex()?))
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    /// Load the ledger and repair it to a fixpoint
    ///
    /// Safe to call repeatedly; a ledger without crash rows is not rewritten.
    pub fn run(&self) -> Result<RepairOutcome> {
        let Some(mut ledger) = Ledger::load(&self.ledger_path)? else {
            return Ok(RepairOutcome::default());
        };

        let removed = self.repair(&mut ledger)?;

        Ok(RepairOutcome {
            ledger: Some(ledger),
            removed,
        })
    }

    /// Repair an already loaded ledger, persisting after every removal
    pub fn repair(&self, ledger: &mut Ledger) -> Result<Vec<u32>> {
        let mut removed = Vec::new();

        while let Some(position) = first_crash_position(&ledger.records, &self.signature) {
            let crash_id = ledger.records[position].id;
            self.remove_crash(ledger, position)?;
            removed.push(crash_id);
        }

        if !ledger.has_dense_ids() {
            tracing::warn!(
                "Ledger {} has non-contiguous game ids",
                self.ledger_path.display()
            );
        }

        Ok(removed)
    }

    fn remove_crash(&self, ledger: &mut Ledger, position: usize) -> Result<()> {
        let crash_id = ledger.records[position].id;
        tracing::info!(
            "Removing crashed game {} from {}",
            crash_id,
            self.ledger_path.display()
        );

        self.companions.remove(crash_id)?;

        let mut later: Vec<u32> = ledger
            .records
            .iter()
            .map(|r| r.id)
            .filter(|&id| id > crash_id)
            .collect();
        later.sort_unstable();
        for id in later {
            self.companions.shift_down(id)?;
        }

        ledger.remove_at_and_renumber(position);
        ledger.save(&self.ledger_path)
    }
}
