//! Shutdown requests: SIGINT/SIGTERM and programmatic stop handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use tracing::warn;

use crate::error::Result;

/// Set from the signal handler; process-wide by nature.
static SIGNAL_RECEIVED: AtomicBool = AtomicBool::new(false);

const SHUTDOWN_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGTERM];

extern "C" fn on_shutdown_signal(_: nix::libc::c_int) {
    SIGNAL_RECEIVED.store(true, Ordering::SeqCst);
}

/// Restores the previous SIGINT/SIGTERM dispositions when dropped.
#[derive(Debug)]
pub struct SignalGuard {
    previous: Vec<(Signal, SigAction)>,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        for (sig, action) in self.previous.drain(..).rev() {
            // SAFETY: `action` is the disposition sigaction returned for `sig`.
            if let Err(e) = unsafe { sigaction(sig, &action) } {
                warn!(signal = ?sig, error = %e, "failed to restore signal handler");
            }
        }
    }
}

/// Route SIGINT and SIGTERM to the shutdown flag until the guard is dropped.
///
/// Clears any signal recorded under an earlier guard.
pub fn install_signal_handlers() -> Result<SignalGuard> {
    let action = SigAction::new(
        SigHandler::Handler(on_shutdown_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    SIGNAL_RECEIVED.store(false, Ordering::SeqCst);

    let mut guard = SignalGuard {
        previous: Vec::with_capacity(SHUTDOWN_SIGNALS.len()),
    };
    for sig in SHUTDOWN_SIGNALS {
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
        // On error the guard restores whatever was already replaced.
        let previous = unsafe { sigaction(sig, &action) }?;
        guard.previous.push((sig, previous));
    }
    Ok(guard)
}

pub fn signal_received() -> bool {
    SIGNAL_RECEIVED.load(Ordering::SeqCst)
}

/// Cloneable flag that asks a supervising master to stop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
