//! Registry error types

use super::id::ConnectionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A connection with this id is already registered
    DuplicateId(ConnectionId),
    /// The connection was not activated before insertion
    NotActive(ConnectionId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateId(id) => write!(f, "Connection already registered: {}", id),
            RegistryError::NotActive(id) => write!(f, "Connection not active: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
