//! Readiness-driven I/O building blocks
//!
//! - [`notifier`] wraps the OS readiness facility (mio).
//! - [`drain`] reads a readable connection until it would block.
//! - [`broadcast`] fans a chunk out to every other connection.
//! - [`outbound`] buffers output a target could not take yet.

pub mod broadcast;
pub mod drain;
pub mod notifier;
pub mod outbound;

pub use broadcast::{Broadcaster, FanOut};
pub use drain::{DrainOutcome, Drainer};
pub use notifier::{Notifier, ReadyEvent};
pub use outbound::{FlushResult, OutboundQueue};
