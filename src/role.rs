//! Process role: master or worker.
//!
//! A worker is the same program re-executed by a master. The master marks its
//! children through the environment; [`Role::detect`] reads that marker once at
//! the entry point and everything below it takes the role explicitly.

use std::env;

use nix::unistd::Pid;

/// Set on every worker; holds the pid of the master that spawned it.
pub const MASTER_PID_ENV: &str = "HERD_MASTER_PID";

/// Set on every worker; holds its 1-based worker id.
pub const WORKER_ID_ENV: &str = "HERD_WORKER_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the listening socket and spawns workers.
    Master,
    /// Serves connections on a listener handed over by `master_pid`.
    Worker { master_pid: Pid, id: Option<usize> },
}

impl Role {
    /// Determine the role of the current process from its environment.
    pub fn detect() -> Self {
        Self::from_vars(
            env::var(MASTER_PID_ENV).ok().as_deref(),
            env::var(WORKER_ID_ENV).ok().as_deref(),
        )
    }

    /// Role for the given marker values. An unparsable master pid counts as
    /// absent, so a stray variable never turns a master into a worker.
    pub fn from_vars(master_pid: Option<&str>, worker_id: Option<&str>) -> Self {
        match master_pid.and_then(|s| s.trim().parse::<i32>().ok()) {
            Some(pid) if pid > 0 => Role::Worker {
                master_pid: Pid::from_raw(pid),
                id: worker_id.and_then(|s| s.trim().parse().ok()),
            },
            _ => Role::Master,
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, Role::Master)
    }

    pub fn is_worker(&self) -> bool {
        !self.is_master()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Worker { id: Some(id), .. } => write!(f, "worker {}", id),
            Role::Worker { id: None, .. } => write!(f, "worker"),
        }
    }
}
