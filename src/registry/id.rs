//! Connection identifiers and notifier tokens
//!
//! Identifiers come from a monotonically increasing counter and are never
//! reused, so a file descriptor recycled by the OS right after a close can never
//! be mistaken for the connection that previously owned it.

use std::fmt;

use mio::Token;

/// Token of the listening socket
pub const LISTENER: Token = Token(0);

/// Token of the shutdown waker
pub const WAKER: Token = Token(1);

/// First value handed out to client connections
pub(crate) const FIRST_CONNECTION_ID: usize = 16;

/// Stable identifier of one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(usize);

impl ConnectionId {
    pub(crate) fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Map a notifier token back to a connection id
    ///
    /// Returns `None` for reserved tokens (listener, waker).
    pub fn from_token(token: Token) -> Option<Self> {
        if token.0 >= FIRST_CONNECTION_ID {
            Some(Self(token.0))
        } else {
            None
        }
    }

    /// Token this connection is registered under
    pub fn token(self) -> Token {
        Token(self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<ConnectionId> for Token {
    fn from(id: ConnectionId) -> Self {
        id.token()
    }
}
