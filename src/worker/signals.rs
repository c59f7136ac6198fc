//! Why a worker process ended.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by signal.
    Signaled(Signal),
    /// Reaped elsewhere or reported by a status we do not track.
    Unknown,
}

impl TerminationReason {
    /// True when the worker ended on its own rather than through a normal
    /// exit or one of the signals the master uses to stop it.
    pub fn is_crash(&self) -> bool {
        match self {
            Self::Exited(code) => *code != 0,
            Self::Signaled(sig) => !matches!(sig, Signal::SIGTERM | Signal::SIGINT | Signal::SIGKILL),
            Self::Unknown => true,
        }
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {}", code),
            Self::Signaled(sig) => format!("killed by signal {:?}", sig),
            Self::Unknown => "unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Analyze a `WaitStatus` to determine the termination reason.
///
/// Returns `None` while the process is still running or merely stopped.
pub fn analyze_wait_status(status: WaitStatus) -> Option<TerminationReason> {
    match status {
        WaitStatus::Exited(_, code) => Some(TerminationReason::Exited(code)),
        WaitStatus::Signaled(_, signal, _) => Some(TerminationReason::Signaled(signal)),
        WaitStatus::StillAlive | WaitStatus::Stopped(..) | WaitStatus::Continued(_) => None,
        #[allow(unreachable_patterns)]
        _ => None,
    }
}
