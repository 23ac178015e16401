//! Companion files - per-game artifacts named `<base>-<id>.<ext>`
//!
//! Level 4 - Utilities

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};

/// Naming scheme for the optional per-game files next to a ledger
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompanionFiles {
    dir: PathBuf,
    base: String,
    extension: String,
}

impl CompanionFiles {
    pub fn new(dir: impl Into<PathBuf>, base: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base: base.into(),
            extension: extension.into(),
        }
    }

    /// Derive the scheme from a ledger path: `dir/run-9x9.dat` gives `dir/run-9x9-<id>.<ext>`
    pub fn for_ledger(ledger: &Path, extension: &str) -> Self {
        let dir = ledger
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let base = ledger
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(dir, base, extension)
    }

    pub fn path(&self, id: u32) -> PathBuf {
        self.dir.join(format!("{}-{}.{}", self.base, id, self.extension))
    }

    /// Delete the file for `id`; returns whether one existed
    pub fn remove(&self, id: u32) -> Result<bool> {
        let path = self.path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BenchError::io(&path, e)),
        }
    }

    /// Rename the file for `id` to `id - 1`; returns whether one existed
    pub fn shift_down(&self, id: u32) -> Result<bool> {
        if id == 0 {
            return Ok(false);
        }

        let from = self.path(id);
        if !from.exists() {
            return Ok(false);
        }

        let to = self.path(id - 1);
        fs::rename(&from, &to).map_err(|e| BenchError::io(&from, e))?;
        tracing::debug!("Renamed {} -> {}", from.display(), to.display());
        Ok(true)
    }
}
