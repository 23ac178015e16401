//! Summary command - win rates and score agreement for ledger files
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: collect_files(), summarize_file(), report_results()
//! - Level 4: formatting utilities

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use gobench_core::{BenchError, Ledger, Summary};

/// Aggregate ledgers are skipped when scanning a directory
const SKIPPED_FILE: &str = "summary.dat";

#[derive(Args)]
pub struct SummaryArgs {
    /// Ledger files (default: every *.dat in the current directory)
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Summary of one file; None when no game has been decided yet
struct FileSummary {
    file: PathBuf,
    summary: Option<Summary>,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

pub fn run(args: SummaryArgs) -> Result<()> {
    let files = if args.files.is_empty() {
        collect_files(Path::new("."))?
    } else {
        args.files.clone()
    };

    let mut summaries = Vec::with_capacity(files.len());
    for file in files {
        if let Some(summary) = summarize_file(&file)? {
            summaries.push(summary);
        }
    }

    report_results(&summaries, args.json)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

/// Every `*.dat` in `dir` except the aggregate file, sorted by name
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir).context("Failed to read directory")? {
        let path = entry?.path();
        let is_ledger = path.extension().map_or(false, |ext| ext == "dat");
        let is_skipped = path.file_name().map_or(false, |name| name == SKIPPED_FILE);
        if is_ledger && !is_skipped {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn summarize_file(file: &Path) -> Result<Option<FileSummary>> {
    let ledger = Ledger::load(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let Some(ledger) = ledger else {
        tracing::warn!("{} does not exist, skipping", file.display());
        return Ok(None);
    };

    let summary = match Summary::from_records(&ledger.records) {
        Ok(summary) => Some(summary),
        Err(BenchError::InsufficientData { .. }) => None,
        Err(e) => return Err(e.into()),
    };

    Ok(Some(FileSummary {
        file: file.to_path_buf(),
        summary,
    }))
}

fn report_results(summaries: &[FileSummary], json: bool) -> Result<()> {
    if json {
        print_json_results(summaries)
    } else {
        for line in text_lines(summaries) {
            println!("{}", line);
        }
        Ok(())
    }
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

fn print_json_results(summaries: &[FileSummary]) -> Result<()> {
    #[derive(serde::Serialize)]
    struct JsonFile<'a> {
        file: String,
        summary: Option<&'a Summary>,
    }

    let output: Vec<JsonFile> = summaries
        .iter()
        .map(|s| JsonFile {
            file: s.file.display().to_string(),
            summary: s.summary.as_ref(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn text_lines(summaries: &[FileSummary]) -> Vec<String> {
    let mut lines = Vec::new();

    for s in summaries {
        let name = s.file.display();
        match &s.summary {
            Some(summary) => {
                lines.push(format!("{}: {}", name, summary.wins_line()));
                if let Some(scoring) = summary.scoring_line() {
                    lines.push(format!("  {}", scoring));
                }
                if summary.unresolved > 0 {
                    lines.push(format!("  {} game(s) without a referee result", summary.unresolved));
                }
            }
            None => lines.push(format!("{}: no decided games", name)),
        }
    }

    lines
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LEDGER: &str = "\
# test
0\tW+2.5\tW+2.5\tW+2.5\t0\t-\t200\t1\t1\t0\t1\t0\t
1\tB+R\tB+R\tB+R\t1\t-\t90\t1\t1\t0\t1\t0\t
2\t?\t?\t?\t0\t-\t10\t1\t1\t0\t1\t1\tTimeout
";

    #[test]
    fn test_collect_files_skips_summary() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b-9x9.dat", "a-9x9.dat", "summary.dat", "a-9x9-0.sgf"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let files = collect_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a-9x9.dat", "b-9x9.dat"]);
    }

    #[test]
    fn test_summarize_file_reports_anomalies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a-9x9.dat");
        std::fs::write(&path, LEDGER).unwrap();

        let summary = summarize_file(&path).unwrap().unwrap();
        let lines = text_lines(&[summary]);

        assert!(lines[0].ends_with("50.00% wins (1 games of 2, ± 68.94 at 95%, ± 70.36 at 99%)"));
        assert!(lines[1].contains("same score (2 of 2"));
        assert_eq!(lines[2], "  1 game(s) without a referee result");
    }

    #[test]
    fn test_summarize_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(summarize_file(&dir.path().join("nope.dat")).unwrap().is_none());

        let empty = dir.path().join("empty.dat");
        std::fs::write(&empty, "# nothing yet\n").unwrap();
        let summary = summarize_file(&empty).unwrap().unwrap();
        assert!(summary.summary.is_none());
        assert_eq!(text_lines(&[summary])[0], format!("{}: no decided games", empty.display()));
    }
}
