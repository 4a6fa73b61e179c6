//! One worker process per input file, reaped asynchronously on SIGCHLD.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────┐
//!                  │     Coordinator      │◄──── barrier poll
//!                  │  (spawn + register)  │
//!                  └──────────┬───────────┘
//!                             │ fork/exec, pipe per worker
//!               ┌─────────────┼─────────────┐
//!         ┌─────▼─────┐ ┌─────▼─────┐ ┌─────▼─────┐
//!         │ Worker 0  │ │ Worker 1  │ │ Worker N  │
//!         │ histogram │ │ histogram │ │ histogram │
//!         └─────┬─────┘ └─────┬─────┘ └─────┬─────┘
//!               │ exit        │ exit        │ exit
//!               └─────────────┼─────────────┘
//!                             │ SIGCHLD -> self-pipe
//!                  ┌──────────▼───────────┐
//!                  │ TerminationNotifier  │ drain waitpid(WNOHANG)
//!                  │  registry -> collect │ write <input><pid>.hist
//!                  └──────────────────────┘
//! ```
//!
//! The [`WorkerRegistry`] lock is held across spawn + register on the
//! coordinator side and across reap + resolve on the notifier side, so a
//! worker can never be reaped before it is registered, and a pid cannot be
//! recycled by the OS while its previous owner is still unresolved.

mod channel;
mod collector;
mod coordinator;
mod notifier;
mod protocol;
mod registry;
mod spawn;
mod spec;
mod status;
pub mod worker_main;

pub use coordinator::{Coordinator, CoordinatorConfig};
pub use spec::{DEFAULT_SENTINEL, parse_inputs};
pub use worker_main::run_worker_main;
