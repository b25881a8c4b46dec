//! Connection registry
//!
//! The registry holds every live client connection, keyed by a stable
//! [`ConnectionId`]. A connection is a member if and only if it is registered
//! with the readiness notifier and its socket is open.
//!
//! # Ownership
//!
//! ```text
//!                    RelayServer (event loop thread)
//!                 ┌─────────────────────────────────┐
//!                 │ registry: ConnectionRegistry {   │
//!                 │   #16 -> Connection { stream,    │
//!                 │          outbound, stats }       │
//!                 │   #17 -> ...                     │
//!                 │ }                                │
//!                 └───────────────┬─────────────────┘
//!                                 │ &mut
//!          ┌──────────────────────┼──────────────────────┐
//!          ▼                      ▼                      ▼
//!      Acceptor               Drainer               Broadcaster
//!      insert()               read_chunk()          peers_of() + send()
//! ```
//!
//! Removal is the single point of destruction: dropping the removed
//! [`Connection`] closes its socket.

pub mod entry;
pub mod error;
pub mod id;
pub mod store;

pub use entry::{Connection, ConnectionState, Delivery};
pub use error::RegistryError;
pub use id::{ConnectionId, LISTENER, WAKER};
pub use store::ConnectionRegistry;
