//! Error types
//!
//! Two layers of failure exist in the relay:
//!
//! - [`Error`] is a process-level fault (bind, listen, notifier). It is the only
//!   error that escapes the event loop.
//! - [`CloseReason`] describes why a single connection was removed. Connection
//!   failures are contained by the event loop and never propagate further.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Process-level error
#[derive(Debug)]
pub enum Error {
    /// Creating, binding or listening on the relay socket failed
    Bind {
        /// Address that was being bound
        addr: SocketAddr,
        /// Underlying OS error
        source: io::Error,
    },
    /// The readiness notifier could not be created or failed while waiting
    Notifier(io::Error),
    /// Any other I/O error outside a single connection
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bind { addr, source } => write!(f, "Failed to bind {}: {}", addr, source),
            Error::Notifier(e) => write!(f, "Readiness notifier failed: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Bind { source, .. } => Some(source),
            Error::Notifier(e) | Error::Io(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result alias for process-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a connection left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly close by the peer (zero-length read, or a write found it gone)
    PeerClosed,
    /// Reading from the connection failed
    ReadFault(io::ErrorKind),
    /// Writing to the connection failed
    WriteFault(io::ErrorKind),
    /// Pending output exceeded the configured limit
    Overflow,
    /// Registering interest with the notifier failed
    Registration(io::ErrorKind),
    /// The relay is shutting down
    Shutdown,
}

impl CloseReason {
    /// Classify a failed write
    ///
    /// Errors that mean the peer has gone away are treated like an orderly
    /// close; everything else is a write fault.
    pub fn from_write_error(err: &io::Error) -> Self {
        if is_peer_gone(err.kind()) {
            CloseReason::PeerClosed
        } else {
            CloseReason::WriteFault(err.kind())
        }
    }

    /// Classify a failed read
    pub fn from_read_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                CloseReason::PeerClosed
            }
            kind => CloseReason::ReadFault(kind),
        }
    }

    /// Whether this close is a fault worth reporting at warn level
    pub fn is_fault(&self) -> bool {
        !matches!(self, CloseReason::PeerClosed | CloseReason::Shutdown)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::ReadFault(kind) => write!(f, "read failed: {}", kind),
            CloseReason::WriteFault(kind) => write!(f, "write failed: {}", kind),
            CloseReason::Overflow => write!(f, "pending output limit exceeded"),
            CloseReason::Registration(kind) => write!(f, "registration failed: {}", kind),
            CloseReason::Shutdown => write!(f, "relay shutting down"),
        }
    }
}

fn is_peer_gone(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::WriteZero
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_error_classification() {
        let gone = io::Error::from(io::ErrorKind::BrokenPipe);
        assert_eq!(CloseReason::from_write_error(&gone), CloseReason::PeerClosed);

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(CloseReason::from_write_error(&reset), CloseReason::PeerClosed);

        let other = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(
            CloseReason::from_write_error(&other),
            CloseReason::WriteFault(io::ErrorKind::PermissionDenied)
        );
    }

    #[test]
    fn test_read_error_classification() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(CloseReason::from_read_error(&reset), CloseReason::PeerClosed);

        let other = io::Error::from(io::ErrorKind::InvalidData);
        assert_eq!(
            CloseReason::from_read_error(&other),
            CloseReason::ReadFault(io::ErrorKind::InvalidData)
        );
    }

    #[test]
    fn test_fault_levels() {
        assert!(!CloseReason::PeerClosed.is_fault());
        assert!(!CloseReason::Shutdown.is_fault());
        assert!(CloseReason::Overflow.is_fault());
        assert!(CloseReason::WriteFault(io::ErrorKind::Other).is_fault());
    }

    #[test]
    fn test_error_display_and_source() {
        let addr: SocketAddr = "127.0.0.1:12345".parse().unwrap();
        let err = Error::Bind {
            addr,
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };

        assert!(err.to_string().starts_with("Failed to bind 127.0.0.1:12345"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
