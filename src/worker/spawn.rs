//! Worker subprocess spawning.
//!
//! Workers re-execute the master's own program with its own arguments. The
//! child learns it is a worker from the environment marker and finds its end
//! of the control channel on stdin.

use std::ffi::OsString;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use nix::unistd::Pid;

use crate::error::{HerdError, Result};
use crate::role::{MASTER_PID_ENV, WORKER_ID_ENV};

/// Program and arguments a worker is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The running program and its arguments, verbatim.
    pub fn current() -> Result<Self> {
        let program = std::env::current_exe().map_err(|e| {
            HerdError::Spawn(format!("failed to get current executable: {}", e))
        })?;
        Ok(Self::new(program, std::env::args_os().skip(1)))
    }
}

/// Start one worker process with `channel` as its stdin.
///
/// The parent's copy of `channel` is closed once the child has it, so the
/// master's end sees EOF when the worker dies.
pub fn spawn_worker_process(
    command: &WorkerCommand,
    id: usize,
    master_pid: Pid,
    channel: UnixStream,
) -> Result<Pid> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .env(MASTER_PID_ENV, master_pid.to_string())
        .env(WORKER_ID_ENV, id.to_string())
        .stdin(Stdio::from(OwnedFd::from(channel)))
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let child = cmd.spawn().map_err(|e| {
        HerdError::Spawn(format!(
            "failed to start {}: {}",
            command.program.display(),
            e
        ))
    })?;

    // Reaping goes through waitpid on the pid, not through `Child`.
    let pid = i32::try_from(child.id())
        .map_err(|_| HerdError::Spawn(format!("pid {} out of range", child.id())))?;
    Ok(Pid::from_raw(pid))
}
