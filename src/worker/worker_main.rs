//! Worker-side bootstrap.
//!
//! Runs inside a process spawned by a master: receive the listener over the
//! control channel on stdin, watch the channel for shutdown, and hand the
//! listener to the server.

use std::net::TcpListener;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;

use tracing::{debug, info, info_span, warn};

use super::ipc::LineReader;
use super::protocol::ControlMessage;
use crate::error::{HerdError, Result};
use crate::handoff::{DescriptorTransport, receive_listener};
use crate::server::Server;

/// Duplicate stdin, where the master put our end of the channel.
pub fn inherited_channel() -> Result<UnixStream> {
    let fd = std::io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .map_err(|e| HerdError::Worker(format!("stdin is not usable as a channel: {}", e)))?;
    Ok(UnixStream::from(fd))
}

/// What the control loop decided.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ControlOutcome {
    /// Master asked us to stop.
    Shutdown,
    /// Master end closed: the master is gone.
    Orphaned,
}

/// Read control messages until one ends the worker.
pub(crate) fn control_loop(channel: UnixStream) -> std::io::Result<ControlOutcome> {
    let mut reader = LineReader::new(channel);
    loop {
        let Some(line) = reader.read_line()? else {
            return Ok(ControlOutcome::Orphaned);
        };
        if line.is_empty() {
            continue;
        }
        match ControlMessage::from_line(line) {
            Ok(ControlMessage::Shutdown) => return Ok(ControlOutcome::Shutdown),
            Err(e) => warn!(error = %e, line, "ignoring unknown control message"),
        }
    }
}

/// Block on the control channel, then end the process.
fn watch_control(channel: UnixStream) {
    match control_loop(channel) {
        Ok(ControlOutcome::Shutdown) => info!("shutdown requested by master"),
        Ok(ControlOutcome::Orphaned) => warn!("master went away, exiting"),
        Err(e) => warn!(error = %e, "control channel failed, exiting"),
    }
    std::process::exit(0);
}

/// Receive the listener from the master.
///
/// Split from [`run_worker`] so the handoff can be exercised without
/// exiting the process.
pub(crate) fn accept_handoff(
    transport: &dyn DescriptorTransport,
    channel: &UnixStream,
) -> Result<TcpListener> {
    let listener = receive_listener(transport, channel)?;
    info!(addr = ?listener.local_addr().ok(), "received listener from master");
    Ok(listener)
}

/// Run the worker side of the handoff and serve until the server returns.
///
/// The control thread exits the process when the master asks for shutdown
/// or disappears.
pub fn run_worker(
    id: Option<usize>,
    server: &mut dyn Server,
    transport: &dyn DescriptorTransport,
) -> Result<()> {
    let span = info_span!("worker", id, pid = std::process::id());
    let _enter = span.enter();

    let channel = inherited_channel()?;
    let listener = accept_handoff(transport, &channel)?;

    let control = channel.try_clone()?;
    let control_span = span.clone();
    std::thread::Builder::new()
        .name("herd-control".to_string())
        .spawn(move || {
            let _enter = control_span.enter();
            watch_control(control);
        })?;

    debug!("handing listener to server");
    server.serve(listener)
}
