//! herd - share one listening socket with a pool of worker processes.
//!
//! A [`Master`] binds a TCP listener once, spawns workers by re-executing the
//! current program, and passes each worker a duplicate of the listener over a
//! private Unix socket pair. Every worker then accepts on the same address and
//! the kernel spreads connections across them.
//!
//! The same program runs on both sides. [`Role::detect`] tells the two apart
//! from the environment, and [`Master::run`] does the right thing for each.

pub mod binding;
pub mod error;
pub mod handoff;
pub mod logging;
pub mod master;
pub mod options;
pub mod plugins;
pub mod role;
pub mod server;
pub mod worker;

pub use binding::{NetworkBinding, TcpBinding};
pub use error::{HerdError, Result};
pub use handoff::{DescriptorTransport, ScmRightsTransport};
pub use master::{Event, Master, Plugin, State, StopHandle};
pub use options::Options;
pub use role::Role;
pub use server::{HelloServer, Server};
pub use worker::{TerminationReason, WorkerCommand, WorkerHandle, WorkerState};
