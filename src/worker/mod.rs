//! Worker processes.
//!
//! ```text
//!                   ┌──────────────────────┐
//!                   │        Master        │
//!                   │  bind + listen once  │
//!                   └──────────┬───────────┘
//!          socketpair + SCM_RIGHTS per worker (stdin)
//!          ┌───────────────────┼───────────────────┐
//!    ┌─────▼─────┐       ┌─────▼─────┐       ┌─────▼─────┐
//!    │ Worker 1  │       │ Worker 2  │       │ Worker N  │
//!    │  accept() │       │  accept() │       │  accept() │
//!    └───────────┘       └───────────┘       └───────────┘
//! ```
//!
//! The master side lives in [`spawn`] and [`proc`]; the child side in
//! [`worker_main`]. Both share the control [`protocol`].

mod ipc;
pub mod proc;
pub mod protocol;
pub mod signals;
pub mod spawn;
pub mod worker_main;

pub use proc::{WorkerHandle, WorkerState};
pub use protocol::ControlMessage;
pub use signals::TerminationReason;
pub use spawn::WorkerCommand;
pub use worker_main::run_worker;
