//! Integration tests for gobench-core
//!
//! Tests the full stack: ledger files on disk, companion files, crash repair
//! and the convergence loop driven by a scripted runner.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gobench_core::{
    first_crash, BenchConfig, BenchError, CompanionFiles, ConvergenceController, CrashRepair,
    GameRecord, Ledger, Phase, StopRule, DEFAULT_CRASH_SIGNATURE,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use regex::Regex;

// ============================================================================
// TEST FIXTURES
// ============================================================================

const HEADER: [&str; 3] = [
    "# Black: GNU Go",
    "# White: Iomrascalai",
    "#GAME\tRES_B\tRES_W\tRES_R\tALT\tDUP\tLEN\tTIME_B\tTIME_W\tCPU_B\tCPU_W\tERR\tERR_MSG",
];

fn header() -> Vec<String> {
    HEADER.iter().map(|s| s.to_string()).collect()
}

/// A full-width row as gogui-twogtp writes it
fn row(id: u32, result: &str, error: &str) -> GameRecord {
    let err_flag = if error.is_empty() { "0" } else { "1" };
    let fields = vec![
        result.to_string(),
        result.to_string(),
        result.to_string(),
        (id % 2).to_string(),
        "-".to_string(),
        "180".to_string(),
        "31.2".to_string(),
        "55.0".to_string(),
        "0".to_string(),
        "55.0".to_string(),
        err_flag.to_string(),
        error.to_string(),
    ];
    GameRecord::new(id, fields).unwrap()
}

fn crash_row(id: u32) -> GameRecord {
    row(id, "?", "The Go program terminated unexpectedly.")
}

fn repair_for(path: &Path) -> (CrashRepair, CompanionFiles) {
    let companions = CompanionFiles::for_ledger(path, "sgf");
    let repair = CrashRepair::new(path, companions.clone(), Regex::new(DEFAULT_CRASH_SIGNATURE).unwrap());
    (repair, companions)
}

fn random_ledger(rng: &mut ChaCha8Rng, len: u32) -> Ledger {
    let records = (0..len)
        .map(|id| match rng.gen_range(0..10) {
            0 | 1 => crash_row(id),
            2 => row(id, "?", "Timeout"),
            3 => row(id, "W+R", ""),
            4..=6 => row(id, &format!("W+{}.5", rng.gen_range(0..40)), ""),
            _ => row(id, &format!("B+{}.5", rng.gen_range(0..40)), ""),
        })
        .collect();
    Ledger::new(header(), records)
}

/// Appends rows up to the requested total, crashing on every `crash_every`th game
fn scripted_runner(ledger: PathBuf, crash_every: u32) -> impl FnMut(usize) -> gobench_core::Result<()> {
    let mut played = 0u32;
    move |total: usize| {
        let mut current = Ledger::load(&ledger)?.unwrap_or_else(|| Ledger::new(header(), vec![]));
        while current.len() < total {
            played += 1;
            let id = current.len() as u32;
            let record = if crash_every > 0 && played % crash_every == 0 {
                crash_row(id)
            } else if played % 3 == 0 {
                row(id, "B+2.5", "")
            } else {
                row(id, "W+4.5", "")
            };
            current.records.push(record);
        }
        current.save(&ledger)
    }
}

// ============================================================================
// LEDGER TESTS
// ============================================================================

#[test]
fn test_save_load_round_trip_random_ledgers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.dat");
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for len in [0, 1, 5, 40] {
        let ledger = random_ledger(&mut rng, len);
        ledger.save(&path).unwrap();
        let loaded = Ledger::load(&path).unwrap().unwrap();
        assert_eq!(loaded, ledger);
    }
}

#[test]
fn test_load_preserves_extra_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wide.dat");
    let text = "# h\n0\tB+1\tB+1\tB+1\t0\t-\t1\t1\t1\t0\t1\t0\t\textra\tmore\n";
    fs::write(&path, text).unwrap();

    let ledger = Ledger::load(&path).unwrap().unwrap();
    assert_eq!(ledger.records[0].column_count(), 15);
    ledger.save(&path).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), text);
}

// ============================================================================
// CRASH REPAIR TESTS
// ============================================================================

#[test]
fn test_repair_end_to_end_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.dat");
    let (repair, companions) = repair_for(&path);

    let ledger = Ledger::new(
        header(),
        vec![
            row(0, "W+3.5", ""),
            row(1, "B+R", ""),
            crash_row(2),
            row(3, "W+R", ""),
            row(4, "B+0.5", ""),
        ],
    );
    ledger.save(&path).unwrap();
    for id in [0, 1, 3, 4] {
        fs::write(companions.path(id), format!("game {}", id)).unwrap();
    }

    let outcome = repair.run().unwrap();
    assert_eq!(outcome.removed, vec![2]);

    let repaired = Ledger::load(&path).unwrap().unwrap();
    assert_eq!(repaired.header, header());
    let ids: Vec<u32> = repaired.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert_eq!(repaired.records[2].result_referee(), "W+R");
    assert_eq!(repaired.records[3].result_referee(), "B+0.5");

    assert_eq!(fs::read_to_string(companions.path(0)).unwrap(), "game 0");
    assert_eq!(fs::read_to_string(companions.path(1)).unwrap(), "game 1");
    assert_eq!(fs::read_to_string(companions.path(2)).unwrap(), "game 3");
    assert_eq!(fs::read_to_string(companions.path(3)).unwrap(), "game 4");
    assert!(!companions.path(4).exists());
}

#[test]
fn test_crash_companion_is_deleted_not_renumbered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.dat");
    let (repair, companions) = repair_for(&path);

    Ledger::new(header(), vec![row(0, "W+1.5", ""), crash_row(1)])
        .save(&path)
        .unwrap();
    fs::write(companions.path(0), "game 0").unwrap();
    fs::write(companions.path(1), "partial").unwrap();

    repair.run().unwrap();

    assert_eq!(fs::read_to_string(companions.path(0)).unwrap(), "game 0");
    assert!(!companions.path(1).exists());
}

#[test]
fn test_repair_random_ledgers_reaches_fixpoint() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let signature = Regex::new(DEFAULT_CRASH_SIGNATURE).unwrap();

    for round in 0..20 {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("random-{}.dat", round));
        let (repair, companions) = repair_for(&path);

        let len = rng.gen_range(0..30);
        let ledger = random_ledger(&mut rng, len);
        ledger.save(&path).unwrap();

        // Each companion holds the original line of its record
        let mut expected = Vec::new();
        for record in &ledger.records {
            if rng.gen_bool(0.7) {
                fs::write(companions.path(record.id), record.to_line()).unwrap();
            }
            if first_crash(std::slice::from_ref(record), &signature).is_none() {
                expected.push(record.clone());
            }
        }

        let outcome = repair.run().unwrap();
        let repaired = outcome.ledger.unwrap();

        assert!(repaired.has_dense_ids(), "round {}", round);
        assert!(first_crash(&repaired.records, &signature).is_none());
        assert_eq!(repaired.len(), expected.len());
        assert_eq!(outcome.removed.len(), len as usize - expected.len());

        for (record, original) in repaired.records.iter().zip(&expected) {
            assert_eq!(record.result_referee(), original.result_referee());
            let companion = companions.path(record.id);
            if companion.exists() {
                assert_eq!(fs::read_to_string(&companion).unwrap(), original.to_line());
            }
        }
        for gone in repaired.len() as u32..len {
            assert!(!companions.path(gone).exists(), "stale companion {}", gone);
        }

        assert_eq!(Ledger::load(&path).unwrap().unwrap(), repaired);
    }
}

// ============================================================================
// CONTROLLER TESTS
// ============================================================================

fn controller_config(dir: &Path, stop: StopRule) -> BenchConfig {
    BenchConfig::default()
        .with_ledger(dir.join("bench-9x9.dat"))
        .with_stop_rule(stop)
}

#[test]
fn test_controller_runs_until_cap_and_repairs_crashes() {
    let dir = tempfile::tempdir().unwrap();
    // Threshold is unreachable with a 2:1 split, so only the cap stops the run
    let config = controller_config(dir.path(), StopRule::new(10, 40, 0.5));
    let runner = scripted_runner(config.ledger.clone(), 7);

    let mut controller = ConvergenceController::new(config.clone(), runner).unwrap();
    assert_eq!(controller.phase(), Phase::Idle);

    let outcome = controller.run().unwrap();
    assert_eq!(controller.phase(), Phase::Done);
    assert!(outcome.crashes_removed > 0);
    assert!(outcome.batches >= 4);

    let ledger = Ledger::load(&config.ledger).unwrap().unwrap();
    let signature = Regex::new(DEFAULT_CRASH_SIGNATURE).unwrap();
    assert!(ledger.has_dense_ids());
    assert!(first_crash(&ledger.records, &signature).is_none());
    assert!(ledger.len() >= 40);

    let summary = outcome.summary.unwrap();
    assert!(summary.games >= 40);
    assert_eq!(outcome.games, ledger.len());
}

#[test]
fn test_controller_requests_current_plus_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = controller_config(dir.path(), StopRule::new(10, 30, 0.5));
    config.batch_size = 10;

    let mut requests = Vec::new();
    let mut inner = scripted_runner(config.ledger.clone(), 0);
    let runner = |total: usize| {
        requests.push(total);
        inner(total)
    };

    let mut controller = ConvergenceController::new(config, runner).unwrap();
    controller.run().unwrap();
    drop(controller);

    assert_eq!(requests, vec![10, 20, 30]);
}

#[test]
fn test_controller_exits_without_running_when_converged() {
    let dir = tempfile::tempdir().unwrap();
    let config = controller_config(dir.path(), StopRule::new(10, 20, 3.0));

    let records = (0..20).map(|id| row(id, "W+1.5", "")).collect();
    Ledger::new(header(), records).save(&config.ledger).unwrap();

    let mut calls = 0;
    let runner = |_: usize| -> gobench_core::Result<()> {
        calls += 1;
        Ok(())
    };
    let mut controller = ConvergenceController::new(config, runner).unwrap();
    let outcome = controller.run().unwrap();
    drop(controller);

    assert_eq!(calls, 0);
    assert_eq!(outcome.batches, 0);
    assert_eq!(outcome.games, 20);
}

#[test]
fn test_controller_aborts_on_malformed_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let config = controller_config(dir.path(), StopRule::default());
    fs::write(&config.ledger, "# header\n0\tB+1\n").unwrap();

    let mut calls = 0;
    let runner = |_: usize| -> gobench_core::Result<()> {
        calls += 1;
        Ok(())
    };
    let mut controller = ConvergenceController::new(config, runner).unwrap();
    let err = controller.run().unwrap_err();
    drop(controller);

    assert!(matches!(err, BenchError::MalformedRecord { line: 2, .. }));
    assert!(err.is_fatal_for_ledger());
    assert_eq!(calls, 0);
}

#[test]
fn test_controller_propagates_runner_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = controller_config(dir.path(), StopRule::default());

    let runner = |_: usize| -> gobench_core::Result<()> {
        Err(BenchError::RunnerTimedOut {
            timeout: Duration::from_secs(5),
        })
    };
    let mut controller = ConvergenceController::new(config, runner).unwrap();

    assert!(matches!(
        controller.run(),
        Err(BenchError::RunnerTimedOut { timeout }) if timeout == Duration::from_secs(5)
    ));
}

#[test]
fn test_controller_aborts_when_repair_cannot_touch_companions() {
    let dir = tempfile::tempdir().unwrap();
    let config = controller_config(dir.path(), StopRule::default());
    let (_, companions) = repair_for(&config.ledger);

    Ledger::new(header(), vec![row(0, "W+1.5", ""), crash_row(1), row(2, "B+0.5", "")])
        .save(&config.ledger)
        .unwrap();
    let before = fs::read_to_string(&config.ledger).unwrap();

    // A directory where the crashed game's companion should be
    let blocker = companions.path(1);
    fs::create_dir(&blocker).unwrap();
    fs::write(blocker.join("keep"), "x").unwrap();
    fs::write(companions.path(2), "game 2").unwrap();

    let mut calls = 0;
    let runner = |_: usize| -> gobench_core::Result<()> {
        calls += 1;
        Ok(())
    };
    let mut controller = ConvergenceController::new(config.clone(), runner).unwrap();
    let err = controller.run().unwrap_err();
    drop(controller);

    assert!(matches!(err, BenchError::Io { ref path, .. } if *path == blocker), "{}", err);
    assert!(err.is_fatal_for_ledger());
    assert_eq!(calls, 0);

    assert_eq!(fs::read_to_string(&config.ledger).unwrap(), before);
    assert_eq!(fs::read_to_string(companions.path(2)).unwrap(), "game 2");
    let entries = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 3, "no backup left behind");
}
