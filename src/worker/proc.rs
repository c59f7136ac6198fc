//! Master-side handle for one worker process.

use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, waitpid};
use nix::unistd::Pid;
use tracing::debug;

use super::ipc::LineWriter;
use super::protocol::ControlMessage;
use super::signals::{TerminationReason, analyze_wait_status};
use crate::error::{HerdError, Result};

/// How long [`WorkerHandle::escalate`] waits between SIGTERM and SIGKILL.
const ESCALATION_GRACE: Duration = Duration::from_millis(100);

/// Lifecycle state of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Exited(TerminationReason),
}

/// A spawned worker: its id, process and private control channel.
pub struct WorkerHandle {
    id: usize,
    pid: Pid,
    channel: LineWriter<UnixStream>,
    state: WorkerState,
}

impl WorkerHandle {
    pub(crate) fn new(id: usize, pid: Pid, channel: UnixStream) -> Self {
        Self {
            id,
            pid,
            channel: LineWriter::new(channel),
            state: WorkerState::Running,
        }
    }

    /// 1-based spawn index.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Whether the process has not been reaped yet.
    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }

    /// Send a control message over the worker's channel.
    pub fn send(&mut self, message: &ControlMessage) -> Result<()> {
        self.channel.write_line(&message.to_line()).map_err(|e| {
            HerdError::Worker(format!("failed to send to worker {}: {}", self.id, e))
        })
    }

    /// Reap the process if it has exited (non-blocking).
    ///
    /// Returns the reason only on the call that observes the exit.
    pub fn try_wait(&mut self) -> Result<Option<TerminationReason>> {
        if !self.is_running() {
            return Ok(None);
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => Ok(analyze_wait_status(status).map(|reason| self.mark_exited(reason))),
            // Someone else reaped it; it is gone either way.
            Err(nix::errno::Errno::ECHILD) => Ok(Some(self.mark_exited(TerminationReason::Unknown))),
            Err(e) => Err(HerdError::Worker(format!("waitpid failed: {}", e))),
        }
    }

    /// Poll [`try_wait`](Self::try_wait) until the process exits or `timeout` elapses.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<TerminationReason>> {
        let start = Instant::now();
        loop {
            if let Some(reason) = self.try_wait()? {
                return Ok(Some(reason));
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Send SIGTERM to the process.
    pub fn terminate(&self) -> Result<()> {
        self.signal(Signal::SIGTERM)
    }

    /// Send SIGKILL to the process and reap it.
    pub fn kill(&mut self) -> Result<TerminationReason> {
        if let WorkerState::Exited(reason) = self.state {
            return Ok(reason);
        }
        self.signal(Signal::SIGKILL)?;
        match waitpid(self.pid, None) {
            Ok(status) => {
                let reason = analyze_wait_status(status).unwrap_or(TerminationReason::Unknown);
                Ok(self.mark_exited(reason))
            }
            Err(nix::errno::Errno::ECHILD) => Ok(self.mark_exited(TerminationReason::Unknown)),
            Err(e) => Err(HerdError::Worker(format!("waitpid failed: {}", e))),
        }
    }

    /// Ask the worker to exit, then escalate to SIGTERM and SIGKILL.
    ///
    /// Returns `None` if the worker had already been reaped.
    pub fn stop(&mut self, timeout: Duration) -> Result<Option<TerminationReason>> {
        if !self.is_running() {
            return Ok(None);
        }

        // A dead worker cannot read; the waits below still reap it.
        let _ = self.send(&ControlMessage::Shutdown);
        if let Some(reason) = self.wait_timeout(timeout)? {
            return Ok(Some(reason));
        }

        debug!(worker_id = self.id, pid = %self.pid, "worker ignored shutdown");
        self.escalate().map(Some)
    }

    /// SIGTERM, a short grace period, then SIGKILL. For a worker that was
    /// already asked to shut down and did not.
    pub fn escalate(&mut self) -> Result<TerminationReason> {
        if let WorkerState::Exited(reason) = self.state {
            return Ok(reason);
        }

        debug!(worker_id = self.id, pid = %self.pid, "sending SIGTERM");
        if let Err(e) = self.terminate() {
            debug!(worker_id = self.id, error = %e, "SIGTERM not delivered");
        }
        if let Some(reason) = self.wait_timeout(ESCALATION_GRACE)? {
            return Ok(reason);
        }

        debug!(worker_id = self.id, pid = %self.pid, "worker ignored SIGTERM, sending SIGKILL");
        self.kill()
    }

    fn signal(&self, sig: Signal) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        signal::kill(self.pid, sig)
            .map_err(|e| HerdError::Worker(format!("failed to send {:?}: {}", sig, e)))
    }

    fn mark_exited(&mut self, reason: TerminationReason) -> TerminationReason {
        self.state = WorkerState::Exited(reason);
        reason
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.terminate();
            std::thread::sleep(Duration::from_millis(10));
            if let Ok(Some(_)) = self.try_wait() {
                return;
            }
            let _ = self.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::fd::OwnedFd;
    use std::process::{Command, Stdio};

    fn spawn_sleeper(id: usize) -> WorkerHandle {
        let (master_end, worker_end) = UnixStream::pair().unwrap();
        let child = Command::new("sleep")
            .arg("60")
            .stdin(Stdio::from(OwnedFd::from(worker_end)))
            .spawn()
            .expect("spawn sleep");
        WorkerHandle::new(id, Pid::from_raw(child.id() as i32), master_end)
    }

    #[test]
    fn test_running_worker_is_not_reaped() {
        let mut handle = spawn_sleeper(1);
        assert!(handle.is_running());
        assert_eq!(handle.try_wait().unwrap(), None);
        assert_eq!(handle.id(), 1);
    }

    #[test]
    fn test_terminate_is_observed_once() {
        let mut handle = spawn_sleeper(2);
        handle.terminate().unwrap();

        let reason = handle
            .wait_timeout(Duration::from_secs(5))
            .unwrap()
            .expect("sleep should die on SIGTERM");
        assert_eq!(reason, TerminationReason::Signaled(Signal::SIGTERM));
        assert!(!handle.is_running());
        assert_eq!(handle.state(), WorkerState::Exited(reason));
        assert_eq!(handle.try_wait().unwrap(), None);
    }

    #[test]
    fn test_stop_escalates_when_shutdown_is_ignored() {
        let mut handle = spawn_sleeper(3);
        let reason = handle
            .stop(Duration::from_millis(50))
            .unwrap()
            .expect("stop should reap the worker");
        assert!(!reason.is_crash());
        assert!(!handle.is_running());
        assert_eq!(handle.stop(Duration::from_millis(50)).unwrap(), None);
    }

    #[test]
    fn test_escalate_sends_no_control_message() {
        let (master_end, worker_end) = UnixStream::pair().unwrap();
        let child = Command::new("sleep")
            .arg("60")
            .stdin(Stdio::null())
            .spawn()
            .expect("spawn sleep");
        let mut handle = WorkerHandle::new(5, Pid::from_raw(child.id() as i32), master_end);

        let reason = handle.escalate().unwrap();
        assert_eq!(reason, TerminationReason::Signaled(Signal::SIGTERM));
        assert!(!handle.is_running());
        assert_eq!(handle.escalate().unwrap(), reason);

        // Nothing was written to the worker's end of the channel.
        worker_end.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 16];
        let err = (&worker_end).read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_kill_reaps() {
        let mut handle = spawn_sleeper(4);
        let reason = handle.kill().unwrap();
        assert_eq!(reason, TerminationReason::Signaled(Signal::SIGKILL));
    }
}
