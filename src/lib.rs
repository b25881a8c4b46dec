//! # relay-rs
//!
//! A TCP broadcast relay: every byte a client sends is forwarded verbatim to
//! every other connected client.
//!
//! The relay runs a single-threaded, readiness-driven event loop on top of
//! mio. One thread accepts connections, drains readable sockets and fans the
//! data out, with no locks and no blocking call other than the readiness wait.
//!
//! ```text
//!   client A ──► Drainer ──► Broadcaster ──► client B, client C, ...
//!                  ▲              │
//!                  │              └─► OutboundQueue (target would block)
//!            Notifier (mio, edge-triggered)
//!                  │
//!              Acceptor ──► ConnectionRegistry
//! ```
//!
//! Payloads are opaque: each successful read becomes one broadcast chunk, with
//! no framing added or interpreted.
//!
//! ## Example
//!
//! ```no_run
//! use relay_rs::{RelayConfig, RelayServer};
//!
//! fn main() -> relay_rs::Result<()> {
//!     let config = RelayConfig::with_addr("127.0.0.1:12345".parse().unwrap());
//!     let mut server = RelayServer::bind(config)?;
//!
//!     let _shutdown = server.shutdown_handle();
//!     // hand `_shutdown` to a signal handler, then:
//!     server.run()
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod registry;
pub mod server;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{CloseReason, Error, Result};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use server::{LoopState, RelayConfig, RelayServer, ShutdownHandle};
pub use stats::{RelayStats, StatsSnapshot};
