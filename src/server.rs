//! The server a worker runs on its inherited listener.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;

/// Request-serving logic wrapped by a [`Master`](crate::Master).
///
/// The master decides when serving begins and with which descriptor; the
/// server only receives an already bound, already listening socket.
pub trait Server: Send {
    fn serve(&mut self, listener: TcpListener) -> Result<()>;
}

/// Minimal HTTP/1.0 responder identifying the worker that accepted the
/// connection. Used by the `herd` binary and its tests.
#[derive(Debug, Clone, Default)]
pub struct HelloServer {
    worker_id: Option<usize>,
    /// Stop after this many connections; `None` serves forever.
    max_connections: Option<usize>,
}

impl HelloServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_id(mut self, id: Option<usize>) -> Self {
        self.worker_id = id;
        self
    }

    pub fn with_max_connections(mut self, n: usize) -> Self {
        self.max_connections = Some(n);
        self
    }

    fn body(&self) -> String {
        let pid = std::process::id();
        match self.worker_id {
            Some(id) => format!("hello from worker {} (pid {})\n", id, pid),
            None => format!("hello from pid {}\n", pid),
        }
    }

    fn respond(&self, mut stream: TcpStream) -> std::io::Result<()> {
        stream.set_read_timeout(Some(Duration::from_secs(1)))?;
        // Drain what the client sent so closing does not reset the connection.
        let mut request = [0u8; 1024];
        let _ = stream.read(&mut request);

        let body = self.body();
        write!(
            stream,
            "HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )?;
        stream.flush()
    }
}

impl Server for HelloServer {
    fn serve(&mut self, listener: TcpListener) -> Result<()> {
        let mut served = 0usize;
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer = stream.peer_addr().ok();
                    if let Err(e) = self.respond(stream) {
                        warn!(?peer, error = %e, "failed to answer connection");
                    } else {
                        debug!(?peer, "answered connection");
                    }
                    served += 1;
                    if self.max_connections.is_some_and(|max| served >= max) {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
        Ok(())
    }
}
