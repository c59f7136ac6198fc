//! Listening-descriptor handoff between master and worker.
//!
//! Each worker gets a private Unix socket pair. The master sends its listening
//! descriptor over its end as SCM_RIGHTS ancillary data; the kernel installs a
//! duplicate in the receiving process that refers to the same open socket, so
//! the worker can `accept` on the master's port without binding anything.
//!
//! A short marker travels with the descriptor because ancillary data cannot be
//! sent without at least one byte of payload. Its content is never inspected.

use std::io::{IoSlice, IoSliceMut};
use std::net::TcpListener;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::errno::Errno;
use nix::sys::socket::{ControlMessage, ControlMessageOwned, MsgFlags, recvmsg, sendmsg};
use tracing::trace;

use crate::error::{HerdError, Result};

/// Payload that accompanies the descriptor.
pub const HANDOFF_MARKER: &[u8] = b"herd";

/// A worker that died before the handoff yields EPIPE, not SIGPIPE.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
const SEND_FLAGS: MsgFlags = MsgFlags::MSG_NOSIGNAL;
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
const SEND_FLAGS: MsgFlags = MsgFlags::empty();

/// Moves an open descriptor across a local channel.
pub trait DescriptorTransport: Send + Sync {
    /// Send a duplicate of `fd` to the peer of `channel`.
    fn send(&self, channel: &UnixStream, fd: BorrowedFd<'_>) -> Result<()>;

    /// Receive one descriptor from the peer of `channel`.
    fn receive(&self, channel: &UnixStream) -> Result<OwnedFd>;
}

/// SCM_RIGHTS over a connected Unix stream socket.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScmRightsTransport;

impl DescriptorTransport for ScmRightsTransport {
    fn send(&self, channel: &UnixStream, fd: BorrowedFd<'_>) -> Result<()> {
        let fds = [fd.as_raw_fd()];
        let iov = [IoSlice::new(HANDOFF_MARKER)];
        let cmsgs = [ControlMessage::ScmRights(&fds)];

        loop {
            match sendmsg::<()>(channel.as_raw_fd(), &iov, &cmsgs, SEND_FLAGS, None) {
                Ok(n) if n == HANDOFF_MARKER.len() => {
                    trace!(fd = fds[0], "sent listening descriptor");
                    return Ok(());
                }
                Ok(n) => {
                    return Err(HerdError::Handoff(format!(
                        "short write: {} of {} marker bytes",
                        n,
                        HANDOFF_MARKER.len()
                    )));
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(HerdError::Handoff(format!("sendmsg failed: {}", e))),
            }
        }
    }

    fn receive(&self, channel: &UnixStream) -> Result<OwnedFd> {
        // Read exactly the marker so later control messages stay in the stream.
        let mut marker = [0u8; HANDOFF_MARKER.len()];
        let mut cmsg_buffer = nix::cmsg_space!([RawFd; 1]);

        let (bytes, truncated, raw_fds) = loop {
            let mut iov = [IoSliceMut::new(&mut marker)];
            match recvmsg::<()>(
                channel.as_raw_fd(),
                &mut iov,
                Some(&mut cmsg_buffer),
                MsgFlags::empty(),
            ) {
                Ok(msg) => {
                    let mut raw_fds: Vec<RawFd> = Vec::new();
                    for cmsg in msg.cmsgs()? {
                        if let ControlMessageOwned::ScmRights(fds) = cmsg {
                            raw_fds.extend(fds);
                        }
                    }
                    break (
                        msg.bytes,
                        msg.flags.contains(MsgFlags::MSG_CTRUNC),
                        raw_fds,
                    );
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(HerdError::Handoff(format!("recvmsg failed: {}", e))),
            }
        };

        // Take ownership of everything the kernel installed before deciding
        // anything, so no descriptor leaks on the error paths.
        // SAFETY: each fd was just created in this process by SCM_RIGHTS and
        // is owned by nobody else.
        let mut owned: Vec<OwnedFd> = raw_fds
            .into_iter()
            .map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
            .collect();

        if bytes == 0 && owned.is_empty() {
            return Err(HerdError::ChannelClosed);
        }
        if truncated {
            return Err(HerdError::Handoff("control data truncated".into()));
        }
        if owned.len() != 1 {
            return Err(HerdError::Handoff(format!(
                "expected 1 descriptor, received {}",
                owned.len()
            )));
        }

        let fd = owned.remove(0);
        trace!(fd = fd.as_raw_fd(), "received listening descriptor");
        Ok(fd)
    }
}

/// Receive a descriptor and wrap it as a TCP listener.
pub fn receive_listener(
    transport: &dyn DescriptorTransport,
    channel: &UnixStream,
) -> Result<TcpListener> {
    let fd = transport.receive(channel)?;
    let listener = TcpListener::from(fd);
    // Fail here rather than on the first accept if the peer sent something
    // that is not a bound socket.
    listener
        .local_addr()
        .map_err(|e| HerdError::Handoff(format!("received descriptor is not a socket: {}", e)))?;
    Ok(listener)
}
