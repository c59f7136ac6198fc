//! Listening socket creation.
//!
//! The master is the only process that ever binds. The three steps are kept
//! separate so a failure names the exact primitive that failed, and so tests
//! can substitute a binding that fails on demand.

use std::io;
use std::net::{SocketAddr, TcpListener};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{HerdError, Result};

/// Socket/bind/listen primitives used by the master.
pub trait NetworkBinding {
    fn create_socket(&self, domain: Domain) -> io::Result<Socket>;
    fn bind(&self, socket: &Socket, addr: SocketAddr) -> io::Result<()>;
    fn listen(&self, socket: &Socket, backlog: i32) -> io::Result<()>;
}

/// Plain blocking TCP listener with `SO_REUSEADDR`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpBinding;

impl NetworkBinding for TcpBinding {
    fn create_socket(&self, domain: Domain) -> io::Result<Socket> {
        // socket2 sets CLOEXEC; workers get the descriptor via SCM_RIGHTS, not inheritance.
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        Ok(socket)
    }

    fn bind(&self, socket: &Socket, addr: SocketAddr) -> io::Result<()> {
        socket.bind(&addr.into())
    }

    fn listen(&self, socket: &Socket, backlog: i32) -> io::Result<()> {
        socket.listen(backlog)
    }
}

/// Run the full create/bind/listen sequence, mapping any failure to a
/// [`HerdError::Bind`] for `addr`.
pub fn open_listener(
    binding: &dyn NetworkBinding,
    addr: SocketAddr,
    backlog: i32,
) -> Result<TcpListener> {
    let bind_err = |source| HerdError::Bind { addr, source };

    let socket = binding
        .create_socket(Domain::for_address(addr))
        .map_err(bind_err)?;
    binding.bind(&socket, addr).map_err(bind_err)?;
    binding.listen(&socket, backlog).map_err(bind_err)?;

    Ok(socket.into())
}
