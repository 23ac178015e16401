//! Match runner - the external tool that plays games into the ledger
//!
//! Level 3 - Step-level implementation

use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};

use crate::config::{RunnerConfig, GAMES_PLACEHOLDER};
use crate::error::{BenchError, Result};

/// Something that tops the ledger up to a requested number of games
///
/// Implementations block until the runner is finished. The request is a
/// total, not an increment: a runner asked for 40 games on a ledger that
/// already holds 30 plays 10 more.
pub trait MatchRunner {
    fn run_until(&mut self, total_games: usize) -> Result<()>;
}

impl<F> MatchRunner for F
where
    F: FnMut(usize) -> Result<()>,
{
    fn run_until(&mut self, total_games: usize) -> Result<()> {
        self(total_games)
    }
}

/// Runs a user-supplied shell command with `{games}` substituted
#[derive(Clone, Debug)]
pub struct ShellRunner {
    template: String,
    timeout: Option<Duration>,
}

impl ShellRunner {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            timeout: None,
        }
    }

    /// Build from configuration; the command is required
    pub fn from_config(config: &RunnerConfig) -> Result<Self> {
        let template = config
            .command
            .clone()
            .ok_or_else(|| BenchError::InvalidConfig("no runner command configured".to_string()))?;

        let mut runner = Self::new(template);
        runner.timeout = config.timeout_secs.map(Duration::from_secs);
        Ok(runner)
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The command line for a given total
    pub fn command_line(&self, total_games: usize) -> String {
        self.template
            .replace(GAMES_PLACEHOLDER, &total_games.to_string())
    }

    fn spawn(&self, command_line: &str) -> Result<Child> {
        shell(command_line)
            .spawn()
            .map_err(|e| BenchError::Runner(format!("failed to start `{}`: {}", command_line, e)))
    }
}

impl MatchRunner for ShellRunner {
    fn run_until(&mut self, total_games: usize) -> Result<()> {
        let command_line = self.command_line(total_games);
        tracing::info!("{}", command_line);

        let child = self.spawn(&command_line)?;
        let status = match self.timeout {
            Some(timeout) => wait_with_timeout(child, timeout)?,
            None => wait(child)?,
        };

        // A participant crash can make the runner exit non-zero; the ledger
        // on disk is what counts.
        if !status.success() {
            tracing::warn!("Match runner exited with {}", status);
        }

        Ok(())
    }
}

/// `sh -c` in a fresh process group, so a timeout reaches everything it spawned
#[cfg(unix)]
fn shell(command_line: &str) -> Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command_line).process_group(0);
    cmd
}

#[cfg(windows)]
fn shell(command_line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command_line);
    cmd
}

fn wait(mut child: Child) -> Result<ExitStatus> {
    child
        .wait()
        .map_err(|e| BenchError::Runner(format!("failed to wait for runner: {}", e)))
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<ExitStatus> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if started.elapsed() >= timeout => {
                kill_tree(&mut child);
                let _ = child.wait();
                return Err(BenchError::RunnerTimedOut { timeout });
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(50)),
            Err(e) => {
                return Err(BenchError::Runner(format!("failed to poll runner: {}", e)));
            }
        }
    }
}

/// Kill the shell and every process in its group
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };

    // SAFETY: kill(2) has no memory effects; a negative pid targets the
    // process group created by `shell`.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::warn!(
            "Failed to kill runner process group {}: {}",
            pgid,
            std::io::Error::last_os_error()
        );
        let _ = child.kill();
    }
}

#[cfg(windows)]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}
