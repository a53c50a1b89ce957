//! Running actions against the VM manager binary.
//!
//! [`Runner`] is the seam between planning and side effects: the real
//! implementation is [`ProcessRunner`], tests use recording fakes. Batches go
//! through [`run_all`], which stops at the first failure and hands that error
//! back untouched. Terminal hand-off is a separate entry point,
//! [`Runner::exec_interactive`], because it never returns on success.

use crate::action::Action;
use crate::context::{CancelToken, RunProgress};
use crate::error::{Error, Result};
use log::{debug, trace};
use std::convert::Infallible;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Executes actions.
pub trait Runner {
    /// Run one action to completion, forwarding its output.
    fn run(&self, action: &Action) -> Result<()>;

    /// Replace the current process with the action. Returns only on failure.
    fn exec_interactive(&self, action: &Action) -> Result<Infallible>;
}

/// Runs actions and captures their standard output.
///
/// Used for observation, where the output is parsed rather than shown.
pub trait Probe {
    fn capture(&self, action: &Action) -> Result<String>;
}

/// Outcome of a successful batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Number of actions that ran to completion
    pub completed: usize,
}

/// Run `actions` in order, stopping at the first failure.
///
/// Interactive actions are rejected before anything runs; they must go
/// through [`Runner::exec_interactive`]. No rollback is attempted: actions
/// that completed before a failure stay applied.
pub fn run_all<R, P>(runner: &R, actions: &[Action], progress: &mut P) -> Result<RunReport>
where
    R: Runner + ?Sized,
    P: RunProgress + ?Sized,
{
    if let Some(action) = actions.iter().find(|a| a.is_interactive()) {
        return Err(Error::InteractiveInBatch {
            command: action.to_string(),
        });
    }

    let total = actions.len();
    let mut report = RunReport::default();
    for (index, action) in actions.iter().enumerate() {
        progress.on_action_start(index, total, action);
        runner.run(action)?;
        progress.on_action_complete(index, action);
        report.completed += 1;
    }
    Ok(report)
}

/// Runner that spawns the VM manager binary.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// Name the binary was looked up by, e.g. `multipass`
    name: String,
    /// Resolved path of the binary
    path: PathBuf,
    cancel: CancelToken,
}

impl ProcessRunner {
    /// Locate `binary` on PATH.
    pub fn new(binary: &str) -> Result<Self> {
        let path = which::which(binary).map_err(|_| Error::BinaryNotFound {
            binary: binary.to_string(),
        })?;
        debug!("using {} at {}", binary, path.display());
        Ok(Self::with_path(binary, path))
    }

    /// Use an explicit binary path without searching PATH.
    pub fn with_path(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            cancel: CancelToken::new(),
        }
    }

    /// Stop waiting (and kill the child) when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.path
    }

    fn command_line(&self, action: &Action) -> String {
        let mut line = self.name.clone();
        for arg in action.args() {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn command(&self, action: &Action) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(action.args());
        cmd
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        loop {
            if self.cancel.is_cancelled() {
                debug!("cancel requested, killing child {}", child.id());
                // The child may already be gone; either way we report cancellation.
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Cancelled);
            }
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            thread::sleep(WAIT_SLICE);
        }
    }
}

/// Write `input` to the child's stdin and close it so the child sees EOF.
///
/// A child that goes away mid-write is killed and reaped before the error
/// is returned.
fn feed_stdin(child: &mut Child, input: &str, command: &str) -> Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    trace!("writing {} bytes to stdin", input.len());
    if let Err(source) = stdin.write_all(input.as_bytes()) {
        drop(stdin);
        debug!("stdin of child {} closed early: {source}", child.id());
        let _ = child.kill();
        let _ = child.wait();
        return Err(Error::Spawn {
            command: command.to_string(),
            source,
        });
    }
    Ok(())
}

impl Runner for ProcessRunner {
    fn run(&self, action: &Action) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let command = self.command_line(action);
        debug!("running {command}");

        let mut cmd = self.command(action);
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        cmd.stdin(if action.input().is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            command: command.clone(),
            source,
        })?;

        if let Some(input) = action.input() {
            feed_stdin(&mut child, input, &command)?;
        }

        let status = self.wait(&mut child)?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command,
                code: status.code(),
                stderr: String::new(),
            })
        }
    }

    #[cfg(unix)]
    fn exec_interactive(&self, action: &Action) -> Result<Infallible> {
        use std::os::unix::process::CommandExt;

        let command = self.command_line(action);
        debug!("handing terminal to {command}");
        let source = self.command(action).exec();
        Err(Error::Spawn { command, source })
    }

    #[cfg(not(unix))]
    fn exec_interactive(&self, action: &Action) -> Result<Infallible> {
        let command = self.command_line(action);
        debug!("handing terminal to {command}");
        let status = self
            .command(action)
            .status()
            .map_err(|source| Error::Spawn {
                command: command.clone(),
                source,
            })?;
        std::process::exit(status.code().unwrap_or(1))
    }
}

impl Probe for ProcessRunner {
    fn capture(&self, action: &Action) -> Result<String> {
        let command = self.command_line(action);
        trace!("capturing {command}");

        let mut cmd = self.command(action);
        cmd.stdin(Stdio::null());
        let output = cmd.output().map_err(|source| Error::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
