//! Lifecycle events and the plugin contract.

use std::net::SocketAddr;

use crate::error::{HerdError, Result};
use crate::master::Master;
use crate::options::Options;
use crate::worker::{TerminationReason, WorkerHandle};

/// Something that happened to the master or one of its workers.
///
/// Events are dispatched synchronously on the master's thread, in the order
/// they happen.
#[derive(Debug)]
pub enum Event<'a> {
    /// `start()` began.
    Start,
    /// A worker was spawned and has its listener.
    Worker(&'a WorkerHandle),
    /// A spawn attempt failed; no handle was registered.
    SpawnError(&'a HerdError),
    /// All initial workers were spawned on the listener at `addr`.
    Listening { addr: SocketAddr },
    /// A worker process ended.
    Exit {
        worker: &'a WorkerHandle,
        reason: TerminationReason,
    },
    /// The master began stopping its workers.
    Shutdown,
}

impl Event<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Worker(_) => "worker",
            Event::SpawnError(_) => "spawn_error",
            Event::Listening { .. } => "listening",
            Event::Exit { .. } => "exit",
            Event::Shutdown => "shutdown",
        }
    }
}

/// Extension hooks for a [`Master`].
///
/// Registration runs in two phases. [`configure`](Plugin::configure) runs in
/// every process, workers included, and must be idempotent. [`apply`](Plugin::apply)
/// runs once, in the master only. Workers never see the side effects of
/// `apply` or `on_event`; anything a worker needs must come from `configure`.
pub trait Plugin {
    fn name(&self) -> &str;

    fn configure(&mut self, _options: &mut Options) -> Result<()> {
        Ok(())
    }

    fn apply(&mut self, _master: &mut Master) -> Result<()> {
        Ok(())
    }

    fn on_event(&mut self, _event: &Event<'_>) {}
}

type Listener = Box<dyn FnMut(&Event<'_>)>;

/// Registered plugins and event listeners.
#[derive(Default)]
pub(crate) struct Hooks {
    pub(crate) plugins: Vec<Box<dyn Plugin>>,
    listeners: Vec<Listener>,
}

impl Hooks {
    pub(crate) fn listen(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Plugins first, then listeners, each in registration order.
    pub(crate) fn emit(&mut self, event: &Event<'_>) {
        tracing::trace!(event = event.name(), "dispatching");
        for plugin in self.plugins.iter_mut() {
            plugin.on_event(event);
        }
        for listener in self.listeners.iter_mut() {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn on_event(&mut self, event: &Event<'_>) {
            self.seen.borrow_mut().push(format!("plugin:{}", event.name()));
        }
    }

    #[test]
    fn test_plugins_see_events_before_listeners() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut hooks = Hooks::default();
        hooks.plugins.push(Box::new(Recorder { seen: seen.clone() }));
        let from_listener = seen.clone();
        hooks.listen(Box::new(move |event: &Event<'_>| {
            from_listener
                .borrow_mut()
                .push(format!("listener:{}", event.name()))
        }));

        hooks.emit(&Event::Start);
        hooks.emit(&Event::Listening {
            addr: "127.0.0.1:1".parse().unwrap(),
        });

        assert_eq!(
            *seen.borrow(),
            vec![
                "plugin:start",
                "listener:start",
                "plugin:listening",
                "listener:listening"
            ]
        );
    }

    #[test]
    fn test_event_names() {
        let err = HerdError::NotListening;
        assert_eq!(Event::SpawnError(&err).name(), "spawn_error");
        assert_eq!(Event::Shutdown.name(), "shutdown");
    }
}
