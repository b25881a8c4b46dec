//! Relay server
//!
//! - [`config`] holds the tunables.
//! - [`listener`] binds the listening socket and drains its accept backlog.
//! - [`event_loop`] is the single-threaded dispatch loop.
//! - [`shutdown`] lets another thread stop the loop.

pub mod config;
pub mod event_loop;
pub mod listener;
pub mod shutdown;

pub use config::RelayConfig;
pub use event_loop::{LoopState, RelayServer};
pub use listener::{AcceptSummary, Acceptor};
pub use shutdown::ShutdownHandle;
