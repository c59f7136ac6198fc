//! The master process.
//!
//! A [`Master`] binds one listening socket, spawns workers, hands each of them
//! a duplicate of that socket and supervises them until shutdown. Constructed
//! with [`Role::Worker`], the same object instead receives the socket from its
//! parent and serves on it, so one program can be both sides.
//!
//! # Example
//!
//! ```no_run
//! use herd::{HelloServer, Master, Role};
//!
//! # fn main() -> herd::Result<()> {
//! let mut master = Master::new(Role::detect(), HelloServer::new());
//! master
//!     .set_worker_count(4)?
//!     .set_address("127.0.0.1:8080".parse().unwrap())?;
//! master.run()
//! # }
//! ```

mod event;
mod shutdown;

pub use event::{Event, Plugin};
pub use shutdown::{SignalGuard, StopHandle, install_signal_handlers, signal_received};

use std::net::{SocketAddr, TcpListener};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use nix::unistd::Pid;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::binding::{NetworkBinding, TcpBinding, open_listener};
use crate::error::{HerdError, Result};
use crate::handoff::{DescriptorTransport, ScmRightsTransport};
use crate::options::{self, Options, default_worker_count};
use crate::role::Role;
use crate::server::Server;
use crate::worker::spawn::spawn_worker_process;
use crate::worker::{ControlMessage, WorkerCommand, WorkerHandle, run_worker};
use event::Hooks;

/// How often [`Master::supervise`] polls for exited workers.
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(100);

/// Where the master is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Configuring,
    Started,
}

pub struct Master {
    pid: Pid,
    role: Role,
    state: State,
    options: Options,
    hooks: Hooks,
    /// Every worker ever spawned; index `i` holds id `i + 1`.
    workers: Vec<WorkerHandle>,
    listener: Option<TcpListener>,
    server: Box<dyn Server>,
    binding: Box<dyn NetworkBinding>,
    transport: Box<dyn DescriptorTransport>,
    worker_command: Option<WorkerCommand>,
    program_dir: PathBuf,
    stop: StopHandle,
    /// SIGINT/SIGTERM routing, held from `start` until `shutdown`.
    signals: Option<SignalGuard>,
    stopping: bool,
}

impl Master {
    pub fn new(role: Role, server: impl Server + 'static) -> Self {
        Self {
            pid: Pid::this(),
            role,
            state: State::Created,
            options: Options::new(),
            hooks: Hooks::default(),
            workers: Vec::new(),
            listener: None,
            server: Box::new(server),
            binding: Box::new(TcpBinding),
            transport: Box::new(ScmRightsTransport),
            worker_command: None,
            program_dir: program_dir(),
            stop: StopHandle::new(),
            signals: None,
            stopping: false,
        }
    }

    /// Replace the socket primitives used by `start`.
    pub fn with_binding(mut self, binding: impl NetworkBinding + 'static) -> Self {
        self.binding = Box::new(binding);
        self
    }

    /// Replace the descriptor transport used on both sides of the handoff.
    pub fn with_transport(mut self, transport: impl DescriptorTransport + 'static) -> Self {
        self.transport = Box::new(transport);
        self
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_worker(&self) -> bool {
        self.role.is_worker()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    /// True iff a truthy value was set for `name`.
    pub fn has_option(&self, name: &str) -> bool {
        self.options.has(name)
    }

    /// All workers spawned so far, dead ones included, in id order.
    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    pub fn worker(&self, id: usize) -> Option<&WorkerHandle> {
        id.checked_sub(1).and_then(|i| self.workers.get(i))
    }

    pub fn live_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_running()).count()
    }

    /// Bound address, once `start` has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Handle another thread can use to end [`supervise`](Self::supervise).
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Resolve `path` against the directory of the running executable.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        normalize(&self.program_dir.join(path))
    }

    fn configuring(&mut self) -> Result<&mut Self> {
        if self.state == State::Started {
            return Err(HerdError::AlreadyStarted);
        }
        self.state = State::Configuring;
        Ok(self)
    }

    pub fn set_option(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.configuring()?.options.set(name, value);
        Ok(self)
    }

    /// Number of workers to spawn. Defaults to the processing-unit count.
    pub fn set_worker_count(&mut self, n: usize) -> Result<&mut Self> {
        if n == 0 {
            return Err(HerdError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }
        self.set_option(options::WORKERS, n)
    }

    pub fn set_address(&mut self, addr: SocketAddr) -> Result<&mut Self> {
        self.configuring()?;
        self.options
            .set(options::HOST, addr.ip().to_string())
            .set(options::PORT, addr.port());
        Ok(self)
    }

    pub fn set_backlog(&mut self, backlog: i32) -> Result<&mut Self> {
        if backlog <= 0 {
            return Err(HerdError::Config(format!(
                "backlog must be positive, got {}",
                backlog
            )));
        }
        self.set_option(options::BACKLOG, backlog)
    }

    /// Replace workers that exit while the master is supervising.
    pub fn set_respawn(&mut self, respawn: bool) -> Result<&mut Self> {
        self.set_option(options::RESPAWN, respawn)
    }

    pub fn set_shutdown_timeout(&mut self, timeout: Duration) -> Result<&mut Self> {
        let millis = u64::try_from(timeout.as_millis())
            .map_err(|_| HerdError::Config("shutdown timeout too large".to_string()))?;
        self.set_option(options::SHUTDOWN_TIMEOUT_MS, millis)
    }

    /// Program and arguments for workers, instead of re-running this process's
    /// own command line.
    pub fn set_worker_command(&mut self, command: WorkerCommand) -> Result<&mut Self> {
        self.configuring()?.worker_command = Some(command);
        Ok(self)
    }

    /// Register a plugin.
    ///
    /// `configure` runs in every process; `apply` runs immediately and only
    /// in the master.
    pub fn use_plugin(&mut self, mut plugin: impl Plugin + 'static) -> Result<&mut Self> {
        self.configuring()?;
        if let Err(e) = plugin.configure(&mut self.options) {
            return Err(plugin_error(plugin.name(), e));
        }
        if self.role.is_master()
            && let Err(e) = plugin.apply(self)
        {
            return Err(plugin_error(plugin.name(), e));
        }

        debug!(plugin = plugin.name(), "registered plugin");
        self.hooks.plugins.push(Box::new(plugin));
        Ok(self)
    }

    /// Observe lifecycle events. Listeners run after plugins.
    pub fn on<F>(&mut self, listener: F) -> &mut Self
    where
        F: FnMut(&Event<'_>) + 'static,
    {
        self.hooks.listen(Box::new(listener));
        self
    }

    /// Alias for [`start`](Self::start).
    pub fn listen(&mut self) -> Result<()> {
        self.start()
    }

    /// Bind, spawn the workers and announce `listening`.
    ///
    /// In a worker process this instead receives the listener from the master
    /// and serves on it until the server returns.
    pub fn start(&mut self) -> Result<()> {
        if self.state == State::Started {
            return Err(HerdError::AlreadyStarted);
        }

        if let Role::Worker { id, .. } = self.role {
            self.state = State::Started;
            return run_worker(id, self.server.as_mut(), self.transport.as_ref());
        }

        let count = self.options.workers().unwrap_or_else(default_worker_count);
        self.options.set(options::WORKERS, count.get());
        let addr = self.options.addr();

        info!(pid = %self.pid, workers = count.get(), %addr, "starting master");
        // Dropped, and the previous handlers restored, if startup fails.
        let signals = install_signal_handlers()?;
        self.hooks.emit(&Event::Start);

        let listener = open_listener(self.binding.as_ref(), addr, self.options.backlog())?;
        let local = listener.local_addr()?;
        self.listener = Some(listener);
        self.signals = Some(signals);
        self.state = State::Started;

        self.spawn(count.get());

        info!(addr = %local, workers = self.live_workers(), "listening");
        self.hooks.emit(&Event::Listening { addr: local });
        Ok(())
    }

    /// Spawn `n` workers in order, emitting `worker` or `spawn_error` after
    /// each attempt. Returns how many started.
    pub fn spawn(&mut self, n: usize) -> usize {
        let mut started = 0;
        for _ in 0..n {
            match self.spawn_worker().map(|worker| worker.id()) {
                Ok(_) => {
                    started += 1;
                    if let Some(worker) = self.workers.last() {
                        self.hooks.emit(&Event::Worker(worker));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to spawn worker");
                    self.hooks.emit(&Event::SpawnError(&e));
                }
            }
        }
        started
    }

    /// Spawn one worker and hand it the listener.
    ///
    /// The handle is registered only after the handoff succeeded.
    pub fn spawn_worker(&mut self) -> Result<&WorkerHandle> {
        if self.role.is_worker() {
            return Err(HerdError::Worker(
                "a worker process cannot spawn workers".to_string(),
            ));
        }
        let listener = self.listener.as_ref().ok_or(HerdError::NotListening)?;
        let id = self.workers.len() + 1;
        let command = match &self.worker_command {
            Some(command) => command.clone(),
            None => WorkerCommand::current()?,
        };

        let (master_end, worker_end) = UnixStream::pair()?;
        let pid = spawn_worker_process(&command, id, self.pid, worker_end)?;

        if let Err(e) = self.transport.send(&master_end, listener.as_fd()) {
            let mut orphan = WorkerHandle::new(id, pid, master_end);
            if let Err(kill_err) = orphan.kill() {
                warn!(worker_id = id, pid = %pid, error = %kill_err, "failed to kill worker after handoff failure");
            }
            return Err(e);
        }

        debug!(worker_id = id, pid = %pid, "worker spawned");
        self.workers.push(WorkerHandle::new(id, pid, master_end));
        Ok(&self.workers[id - 1])
    }

    /// Reap exited workers, emitting `exit` for each and respawning when
    /// enabled. Returns how many exits were observed.
    pub fn reap(&mut self) -> usize {
        let mut exited = 0;
        for i in 0..self.workers.len() {
            let reason = match self.workers[i].try_wait() {
                Ok(Some(reason)) => reason,
                Ok(None) => continue,
                Err(e) => {
                    warn!(worker_id = i + 1, error = %e, "failed to poll worker");
                    continue;
                }
            };
            exited += 1;

            let worker = &self.workers[i];
            if reason.is_crash() {
                warn!(worker_id = worker.id(), pid = %worker.pid(), %reason, "worker died");
            } else {
                info!(worker_id = worker.id(), pid = %worker.pid(), %reason, "worker exited");
            }
            self.hooks.emit(&Event::Exit { worker, reason });

            if self.options.respawn() && !self.stopping {
                self.spawn(1);
            }
        }
        exited
    }

    /// Poll workers until a stop is requested (signal or [`StopHandle`]) or
    /// none are left alive, then shut down.
    ///
    /// SIGINT and SIGTERM are routed to the stop flag from `start` until
    /// `shutdown`. Running out of workers is an error.
    pub fn supervise(&mut self) -> Result<()> {
        if self.listener.is_none() {
            return Err(HerdError::NotListening);
        }

        let exhausted = loop {
            if self.stop.is_stopped() || signal_received() {
                info!("shutdown requested");
                break false;
            }
            self.reap();
            if self.live_workers() == 0 {
                warn!("no workers left alive");
                break true;
            }
            std::thread::sleep(SUPERVISE_INTERVAL);
        };

        self.shutdown()?;
        if exhausted {
            return Err(HerdError::Worker("all workers exited".to_string()));
        }
        Ok(())
    }

    /// Stop every live worker: ask over the control channel, wait for the
    /// shutdown timeout, then escalate to signals.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.stopping {
            return Ok(());
        }
        self.stopping = true;
        self.hooks.emit(&Event::Shutdown);

        // Ask everyone first so workers wind down in parallel.
        for worker in self.workers.iter_mut().filter(|w| w.is_running()) {
            if let Err(e) = worker.send(&ControlMessage::Shutdown) {
                debug!(worker_id = worker.id(), error = %e, "shutdown message not delivered");
            }
        }

        let deadline = Instant::now() + self.options.shutdown_timeout();
        for i in 0..self.workers.len() {
            if !self.workers[i].is_running() {
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let stopped = match self.workers[i].wait_timeout(remaining) {
                Ok(Some(reason)) => Ok(Some(reason)),
                Ok(None) => self.workers[i].escalate().map(Some),
                Err(e) => Err(e),
            };
            match stopped {
                Ok(Some(reason)) => {
                    let worker = &self.workers[i];
                    debug!(worker_id = worker.id(), %reason, "worker stopped");
                    self.hooks.emit(&Event::Exit { worker, reason });
                }
                Ok(None) => {}
                Err(e) => warn!(worker_id = i + 1, error = %e, "failed to stop worker"),
            }
        }

        self.listener = None;
        self.signals = None;
        info!("all workers stopped");
        Ok(())
    }

    /// `start`, then supervise until shutdown when this is the master.
    pub fn run(&mut self) -> Result<()> {
        self.start()?;
        if self.role.is_master() {
            self.supervise()?;
        }
        Ok(())
    }
}

fn plugin_error(name: &str, e: HerdError) -> HerdError {
    match e {
        e @ HerdError::Plugin { .. } => e,
        e => HerdError::Plugin {
            name: name.to_string(),
            message: e.to_string(),
        },
    }
}

/// Absolute directory of the running executable.
fn program_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::HelloServer;
    use crate::worker::{TerminationReason, WorkerState};
    use nix::sys::signal::Signal;
    use socket2::{Domain, Socket};
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    fn sleeper() -> WorkerCommand {
        WorkerCommand::new("sleep", ["30"])
    }

    fn test_master() -> Master {
        let mut master = Master::new(Role::Master, HelloServer::new());
        master
            .set_address("127.0.0.1:0".parse().unwrap())
            .unwrap()
            .set_worker_command(sleeper())
            .unwrap()
            .set_shutdown_timeout(Duration::from_millis(50))
            .unwrap();
        master
    }

    fn record_events(master: &mut Master) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        master.on(move |event| {
            let entry = match event {
                Event::Worker(w) => format!("worker:{}", w.id()),
                Event::Exit { worker, .. } => format!("exit:{}", worker.id()),
                other => other.name().to_string(),
            };
            sink.borrow_mut().push(entry);
        });
        seen
    }

    struct CountingPlugin {
        applied: Rc<RefCell<usize>>,
        configured: Rc<RefCell<usize>>,
    }

    impl Plugin for CountingPlugin {
        fn name(&self) -> &str {
            "counting"
        }

        fn configure(&mut self, options: &mut Options) -> Result<()> {
            *self.configured.borrow_mut() += 1;
            options.set("counting", true);
            Ok(())
        }

        fn apply(&mut self, master: &mut Master) -> Result<()> {
            *self.applied.borrow_mut() += 1;
            master.set_worker_count(2)?;
            Ok(())
        }
    }

    fn counting() -> (CountingPlugin, Rc<RefCell<usize>>, Rc<RefCell<usize>>) {
        let applied = Rc::new(RefCell::new(0));
        let configured = Rc::new(RefCell::new(0));
        (
            CountingPlugin {
                applied: applied.clone(),
                configured: configured.clone(),
            },
            applied,
            configured,
        )
    }

    #[test]
    fn test_plugin_applied_once_in_master() {
        let (plugin, applied, configured) = counting();
        let mut master = Master::new(Role::Master, HelloServer::new());
        master.use_plugin(plugin).unwrap();

        assert_eq!(*applied.borrow(), 1);
        assert_eq!(*configured.borrow(), 1);
        assert!(master.has_option("counting"));
        assert_eq!(master.options().workers().map(|n| n.get()), Some(2));
    }

    #[test]
    fn test_plugin_not_applied_in_worker() {
        let (plugin, applied, configured) = counting();
        let role = Role::Worker {
            master_pid: Pid::from_raw(1),
            id: Some(1),
        };
        let mut master = Master::new(role, HelloServer::new());
        master.use_plugin(plugin).unwrap();

        assert_eq!(*applied.borrow(), 0);
        assert_eq!(*configured.borrow(), 1);
        assert!(master.has_option("counting"));
        assert!(!master.has_option("workers"));
    }

    struct FailingPlugin;

    impl Plugin for FailingPlugin {
        fn name(&self) -> &str {
            "failing"
        }

        fn apply(&mut self, _master: &mut Master) -> Result<()> {
            Err(HerdError::Config("nope".to_string()))
        }
    }

    #[test]
    fn test_plugin_error_names_plugin() {
        let mut master = Master::new(Role::Master, HelloServer::new());
        let Err(err) = master.use_plugin(FailingPlugin) else {
            panic!("failing plugin was registered");
        };
        match err {
            HerdError::Plugin { name, message } => {
                assert_eq!(name, "failing");
                assert!(message.contains("nope"));
            }
            other => panic!("expected plugin error, got {other:?}"),
        }
    }

    #[test]
    fn test_has_option() {
        let mut master = Master::new(Role::Master, HelloServer::new());
        assert_eq!(master.state(), State::Created);
        assert!(!master.has_option("workers"));
        master.set_worker_count(3).unwrap();
        assert!(master.has_option("workers"));
        assert_eq!(master.state(), State::Configuring);
        assert!(!master.has_option("never-set"));
    }

    #[test]
    fn test_zero_workers_rejected_at_configuration() {
        let mut master = Master::new(Role::Master, HelloServer::new());
        assert!(matches!(
            master.set_worker_count(0),
            Err(HerdError::Config(_))
        ));
        assert!(!master.has_option("workers"));
        assert!(master.set_backlog(0).is_err());
    }

    #[test]
    fn test_resolve_is_pure_and_absolute() {
        let master = Master::new(Role::Master, HelloServer::new());
        let exe_dir = std::env::current_exe()
            .unwrap()
            .parent()
            .unwrap()
            .to_path_buf();

        let first = master.resolve("config/app.toml");
        let second = master.resolve("config/app.toml");
        assert_eq!(first, second);
        assert!(first.is_absolute());
        assert_eq!(first, normalize(&exe_dir.join("config/app.toml")));
        assert_eq!(master.resolve("."), normalize(&exe_dir));
        assert_eq!(master.resolve("/etc/herd"), PathBuf::from("/etc/herd"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[test]
    fn test_spawn_worker_requires_listener() {
        let mut master = test_master();
        assert!(matches!(
            master.spawn_worker(),
            Err(HerdError::NotListening)
        ));
        assert!(master.workers().is_empty());
    }

    #[test]
    fn test_start_spawns_with_sequential_ids_and_ordered_events() {
        let mut master = test_master();
        master.set_worker_count(3).unwrap();
        let seen = record_events(&mut master);

        master.start().unwrap();

        assert_eq!(
            *seen.borrow(),
            vec!["start", "worker:1", "worker:2", "worker:3", "listening"]
        );
        let ids: Vec<usize> = master.workers().iter().map(WorkerHandle::id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(master.live_workers(), 3);
        assert_eq!(master.state(), State::Started);
        assert_ne!(master.local_addr().unwrap().port(), 0);

        master.shutdown().unwrap();
        assert_eq!(master.live_workers(), 0);
        assert!(seen.borrow().iter().any(|e| e == "shutdown"));
    }

    #[test]
    fn test_ids_keep_counting_after_start() {
        let mut master = test_master();
        master.set_worker_count(1).unwrap();
        master.start().unwrap();

        let id = master.spawn_worker().unwrap().id();
        assert_eq!(id, 2);
        assert_eq!(master.spawn(2), 2);
        let ids: Vec<usize> = master.workers().iter().map(WorkerHandle::id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        master.shutdown().unwrap();
    }

    #[test]
    fn test_configuration_frozen_after_start() {
        let mut master = test_master();
        master.set_worker_count(1).unwrap();
        master.start().unwrap();
        assert!(matches!(
            master.set_worker_count(2),
            Err(HerdError::AlreadyStarted)
        ));
        assert!(matches!(master.start(), Err(HerdError::AlreadyStarted)));
        master.shutdown().unwrap();
    }

    #[test]
    fn test_spawn_failure_is_reported_not_registered() {
        let mut master = test_master();
        master
            .set_worker_count(2)
            .unwrap()
            .set_worker_command(WorkerCommand::new(
                "/nonexistent/herd-worker",
                Vec::<String>::new(),
            ))
            .unwrap();
        let seen = record_events(&mut master);

        master.start().unwrap();

        assert_eq!(
            *seen.borrow(),
            vec!["start", "spawn_error", "spawn_error", "listening"]
        );
        assert!(master.workers().is_empty());
    }

    struct BrokenTransport;

    impl DescriptorTransport for BrokenTransport {
        fn send(&self, _channel: &UnixStream, _fd: std::os::fd::BorrowedFd<'_>) -> Result<()> {
            Err(HerdError::Handoff("transport down".to_string()))
        }

        fn receive(&self, _channel: &UnixStream) -> Result<std::os::fd::OwnedFd> {
            Err(HerdError::ChannelClosed)
        }
    }

    #[test]
    fn test_failed_handoff_kills_child_and_registers_nothing() {
        let mut master = test_master().with_transport(BrokenTransport);
        master.set_worker_count(2).unwrap();
        let seen = record_events(&mut master);

        master.start().unwrap();

        assert_eq!(
            *seen.borrow(),
            vec!["start", "spawn_error", "spawn_error", "listening"]
        );
        assert!(master.workers().is_empty());
        assert_eq!(master.live_workers(), 0);
    }

    struct RefusingBinding;

    impl NetworkBinding for RefusingBinding {
        fn create_socket(&self, _domain: Domain) -> io::Result<Socket> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "no sockets"))
        }

        fn bind(&self, _socket: &Socket, _addr: SocketAddr) -> io::Result<()> {
            unreachable!()
        }

        fn listen(&self, _socket: &Socket, _backlog: i32) -> io::Result<()> {
            unreachable!()
        }
    }

    #[test]
    fn test_bind_failure_aborts_start() {
        let mut master = test_master().with_binding(RefusingBinding);
        master.set_worker_count(3).unwrap();
        let seen = record_events(&mut master);

        let err = master.start().unwrap_err();

        assert!(matches!(err, HerdError::Bind { .. }));
        assert_eq!(*seen.borrow(), vec!["start"]);
        assert!(master.workers().is_empty());
        assert_eq!(master.local_addr(), None);
        assert_ne!(master.state(), State::Started);
    }

    #[test]
    fn test_reap_detects_dead_worker_and_keeps_handle() {
        let mut master = test_master();
        master.set_worker_count(2).unwrap();
        let seen = record_events(&mut master);
        master.start().unwrap();

        master.worker(1).unwrap().terminate().unwrap();
        let mut exited = 0;
        for _ in 0..200 {
            exited += master.reap();
            if exited > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(exited, 1);
        assert_eq!(
            master.worker(1).unwrap().state(),
            WorkerState::Exited(TerminationReason::Signaled(Signal::SIGTERM))
        );
        assert!(master.worker(2).unwrap().is_running());
        assert_eq!(master.workers().len(), 2);
        assert!(seen.borrow().iter().any(|e| e == "exit:1"));
        master.shutdown().unwrap();
    }

    #[test]
    fn test_respawn_replaces_dead_worker_with_new_id() {
        let mut master = test_master();
        master
            .set_worker_count(1)
            .unwrap()
            .set_respawn(true)
            .unwrap();
        master.start().unwrap();

        master.worker(1).unwrap().terminate().unwrap();
        for _ in 0..200 {
            if master.reap() > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(master.workers().len(), 2);
        assert!(!master.worker(1).unwrap().is_running());
        assert!(master.worker(2).unwrap().is_running());
        assert_eq!(master.live_workers(), 1);
        master.shutdown().unwrap();
    }

    #[test]
    fn test_supervise_returns_on_stop_handle() {
        let mut master = test_master();
        master.set_worker_count(2).unwrap();
        master.start().unwrap();

        let stop = master.stop_handle();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            stop.stop();
        });

        master.supervise().unwrap();
        stopper.join().unwrap();
        assert_eq!(master.live_workers(), 0);
        assert_eq!(master.local_addr(), None);
    }

    #[test]
    fn test_supervise_fails_when_every_worker_exits() {
        let mut master = test_master();
        master
            .set_worker_count(2)
            .unwrap()
            .set_worker_command(WorkerCommand::new("sleep", ["0.2"]))
            .unwrap();
        let seen = record_events(&mut master);
        master.start().unwrap();

        let err = master.supervise().unwrap_err();

        assert!(matches!(err, HerdError::Worker(ref m) if m.contains("all workers exited")));
        assert_eq!(master.live_workers(), 0);
        assert!(seen.borrow().iter().any(|e| e == "shutdown"));
        assert_eq!(master.local_addr(), None);
    }

    #[test]
    fn test_supervise_before_start_fails() {
        let mut master = test_master();
        assert!(matches!(
            master.supervise(),
            Err(HerdError::NotListening)
        ));
    }
}
