//! Built-in plugins.

use std::fs;
use std::path::{Path, PathBuf};

use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::master::{Event, Master, Plugin};

/// Logs every lifecycle event.
#[derive(Debug, Default)]
pub struct Logger;

impl Plugin for Logger {
    fn name(&self) -> &str {
        "logger"
    }

    fn on_event(&mut self, event: &Event<'_>) {
        match event {
            Event::Start => info!("master starting"),
            Event::Worker(worker) => {
                info!(worker_id = worker.id(), pid = %worker.pid(), "worker started")
            }
            Event::SpawnError(e) => warn!(error = %e, "worker failed to start"),
            Event::Listening { addr } => info!(%addr, "listening"),
            Event::Exit { worker, reason } if reason.is_crash() => {
                warn!(worker_id = worker.id(), pid = %worker.pid(), %reason, "worker crashed")
            }
            Event::Exit { worker, reason } => {
                info!(worker_id = worker.id(), pid = %worker.pid(), %reason, "worker exited")
            }
            Event::Shutdown => info!("shutting down"),
        }
    }
}

/// Keeps `master.pid` and `worker.<id>.pid` files in a directory.
///
/// A relative directory is resolved against the executable's directory.
#[derive(Debug)]
pub struct PidFiles {
    dir: PathBuf,
    master_pid: Option<Pid>,
}

impl PidFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            master_pid: None,
        }
    }

    /// Directory the files are written to; absolute once applied.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn master_path(&self) -> PathBuf {
        self.dir.join("master.pid")
    }

    fn worker_path(&self, id: usize) -> PathBuf {
        self.dir.join(format!("worker.{}.pid", id))
    }

    fn write(&self, path: &Path, pid: Pid) {
        match fs::write(path, format!("{}\n", pid)) {
            Ok(()) => debug!(path = %path.display(), %pid, "wrote pid file"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write pid file"),
        }
    }

    fn remove(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "failed to remove pid file");
        }
    }
}

impl Plugin for PidFiles {
    fn name(&self) -> &str {
        "pid-files"
    }

    fn apply(&mut self, master: &mut Master) -> Result<()> {
        self.dir = master.resolve(&self.dir);
        fs::create_dir_all(&self.dir)?;
        self.master_pid = Some(master.pid());
        Ok(())
    }

    fn on_event(&mut self, event: &Event<'_>) {
        match event {
            Event::Start => {
                if let Some(pid) = self.master_pid {
                    self.write(&self.master_path(), pid);
                }
            }
            Event::Worker(worker) => self.write(&self.worker_path(worker.id()), worker.pid()),
            Event::Exit { worker, .. } => self.remove(&self.worker_path(worker.id())),
            Event::Shutdown => self.remove(&self.master_path()),
            _ => {}
        }
    }
}
