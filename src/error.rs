//! Error types for herd.

use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for herd.
#[derive(Error, Debug)]
pub enum HerdError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Master already started; configuration is frozen")]
    AlreadyStarted,

    #[error("Master is not listening yet. Call start() before spawning workers.")]
    NotListening,

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    #[error("Descriptor handoff failed: {0}")]
    Handoff(String),

    #[error("Control channel closed before the listener was received")]
    ChannelClosed,

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Plugin '{name}' failed: {message}")]
    Plugin { name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("System call failed: {0}")]
    Sys(#[from] nix::errno::Errno),
}

/// Result type alias for herd operations.
pub type Result<T> = std::result::Result<T, HerdError>;
