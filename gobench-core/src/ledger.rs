//! Ledger - the tab-separated match result file and its comment header
//!
//! Level 3 - Step-level implementation
//!
//! The external match runner appends one row per finished game. Lines that
//! start with `#` are header metadata and are carried through untouched.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};

/// Lines starting with this character are header metadata
pub const COMMENT_MARKER: char = '#';

/// Column holding the game id
pub const GAME_ID: usize = 0;
/// Column holding black's self-reported result
pub const RESULT_BLACK: usize = 1;
/// Column holding white's self-reported result
pub const RESULT_WHITE: usize = 2;
/// Column holding the referee's (authoritative) result
pub const RESULT_REFEREE: usize = 3;
/// Column holding the diagnostic text of a failed game
pub const ERROR_MESSAGE: usize = 12;
/// Rows with fewer columns than this cannot be interpreted
pub const MIN_COLUMNS: usize = RESULT_REFEREE + 1;

/// Result string used when an outcome is unknown
pub const UNKNOWN_RESULT: &str = "?";

/// One row of the ledger
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameRecord {
    /// Game id, dense over `0..len`
    pub id: u32,
    /// Every column after the id, in file order
    fields: Vec<String>,
}

impl GameRecord {
    /// Create a record from its id and the columns that follow it
    pub fn new(id: u32, fields: Vec<String>) -> Result<Self> {
        if fields.len() + 1 < MIN_COLUMNS {
            return Err(BenchError::MalformedRecord {
                line: 0,
                reason: format!("expected at least {} columns, got {}", MIN_COLUMNS, fields.len() + 1),
            });
        }
        Ok(Self { id, fields })
    }

    /// Parse a single data line (without its terminator)
    pub fn parse(line: &str, line_number: usize) -> Result<Self> {
        let mut columns = line.split('\t');
        let raw_id = columns.next().unwrap_or_default();
        let fields: Vec<String> = columns.map(str::to_string).collect();

        if fields.len() + 1 < MIN_COLUMNS {
            return Err(BenchError::MalformedRecord {
                line: line_number,
                reason: format!("expected at least {} columns, got {}", MIN_COLUMNS, fields.len() + 1),
            });
        }

        let id = raw_id.trim().parse::<u32>().map_err(|_| BenchError::MalformedRecord {
            line: line_number,
            reason: format!("game id {:?} is not a non-negative integer", raw_id),
        })?;

        Ok(Self { id, fields })
    }

    /// Column by absolute index (0 is the id, which is not stored as text)
    pub fn column(&self, index: usize) -> Option<&str> {
        if index == GAME_ID {
            return None;
        }
        self.fields.get(index - 1).map(String::as_str)
    }

    pub fn result_black(&self) -> &str {
        self.column(RESULT_BLACK).unwrap_or(UNKNOWN_RESULT)
    }

    pub fn result_white(&self) -> &str {
        self.column(RESULT_WHITE).unwrap_or(UNKNOWN_RESULT)
    }

    pub fn result_referee(&self) -> &str {
        self.column(RESULT_REFEREE).unwrap_or(UNKNOWN_RESULT)
    }

    /// Diagnostic text, if the row is wide enough to carry one
    pub fn error_message(&self) -> Option<&str> {
        self.column(ERROR_MESSAGE)
    }

    /// Number of columns including the id
    pub fn column_count(&self) -> usize {
        self.fields.len() + 1
    }

    /// Serialize back to a tab-separated line (no terminator)
    pub fn to_line(&self) -> String {
        let mut line = self.id.to_string();
        for field in &self.fields {
            line.push('\t');
            line.push_str(field);
        }
        line
    }
}

/// Header lines plus records, in physical (and id) order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    /// Comment lines, verbatim and without terminators
    pub header: Vec<String>,
    pub records: Vec<GameRecord>,
}

impl Ledger {
    pub fn new(header: Vec<String>, records: Vec<GameRecord>) -> Self {
        Self { header, records }
    }

    /// Load a ledger from disk
    ///
    /// Returns `Ok(None)` when the file does not exist yet: no games have
    /// been played, which is a normal starting state.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BenchError::io(path, e)),
        };

        Self::parse(&contents).map(Some)
    }

    /// Split text into header and records
    pub fn parse(contents: &str) -> Result<Self> {
        let mut ledger = Ledger::default();

        for (index, raw) in contents.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.starts_with(COMMENT_MARKER) {
                ledger.header.push(line.to_string());
            } else if !line.trim().is_empty() {
                ledger.records.push(GameRecord::parse(line, index + 1)?);
            }
        }

        Ok(ledger)
    }

    /// Render the header followed by every record
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for line in &self.header {
            text.push_str(line);
            text.push('\n');
        }
        for record in &self.records {
            text.push_str(&record.to_line());
            text.push('\n');
        }
        text
    }

    /// Replace the file at `path` with this ledger
    ///
    /// The existing file is first renamed to a timestamped backup. The backup
    /// is removed only once the new file is fully written; on failure it stays
    /// behind as the recovery point.
    pub fn save(&self, path: &Path) -> Result<()> {
        let backup = if path.exists() {
            let backup = backup_path(path);
            fs::rename(path, &backup).map_err(|e| BenchError::io(path, e))?;
            tracing::debug!("Backed up {} to {}", path.display(), backup.display());
            Some(backup)
        } else {
            None
        };

        write_synced(path, self.to_text().as_bytes())?;

        if let Some(backup) = backup {
            fs::remove_file(&backup).map_err(|e| BenchError::io(&backup, e))?;
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether ids are exactly `0..len` in physical order
    pub fn has_dense_ids(&self) -> bool {
        self.records
            .iter()
            .enumerate()
            .all(|(i, r)| r.id as usize == i)
    }

    /// Remove the record with `id` and close the gap in the numbering
    ///
    /// Companion files are not touched here; see [`crate::CrashRepair`].
    pub fn remove_and_renumber(&mut self, id: u32) -> Option<GameRecord> {
        let position = self.records.iter().position(|r| r.id == id)?;
        self.remove_at_and_renumber(position)
    }

    /// Same as [`Ledger::remove_and_renumber`] for the record at `position`
    ///
    /// Unambiguous when the ledger carries duplicate ids.
    pub fn remove_at_and_renumber(&mut self, position: usize) -> Option<GameRecord> {
        if position >= self.records.len() {
            return None;
        }
        let removed = self.records.remove(position);

        for record in self.records.iter_mut().filter(|r| r.id > removed.id) {
            record.id -= 1;
        }

        Some(removed)
    }
}

/// Timestamped sibling name used while a ledger is being replaced
fn backup_path(path: &Path) -> PathBuf {
    let now = chrono::Utc::now();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ledger".to_string());

    path.with_file_name(format!(
        "{}-{}.{:06}",
        name,
        now.timestamp(),
        now.timestamp_subsec_micros()
    ))
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| BenchError::io(path, e))?;
    file.write_all(bytes).map_err(|e| BenchError::io(path, e))?;
    file.sync_all().map_err(|e| BenchError::io(path, e))
}
