//! Connection registry implementation
//!
//! The registry owns every live connection from the moment it is registered
//! with the notifier until it is removed. It is owned by the event loop and
//! passed by reference to the acceptor, drainer and broadcaster; nothing else
//! can reach it.

use std::collections::BTreeMap;

use super::entry::{Connection, ConnectionState};
use super::error::RegistryError;
use super::id::{ConnectionId, FIRST_CONNECTION_ID};

/// Ordered set of live connections keyed by id
///
/// Iteration order is id order, which is also accept order.
#[derive(Debug)]
pub struct ConnectionRegistry<S> {
    connections: BTreeMap<ConnectionId, Connection<S>>,
    next_id: usize,
}

impl<S> ConnectionRegistry<S> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: FIRST_CONNECTION_ID,
        }
    }

    /// Hand out a fresh id; ids are never reused
    pub fn allocate_id(&mut self) -> ConnectionId {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add an activated connection
    pub fn insert(&mut self, connection: Connection<S>) -> Result<(), RegistryError> {
        let id = connection.id();

        if connection.state() != ConnectionState::Active {
            return Err(RegistryError::NotActive(id));
        }
        if self.connections.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }

        self.connections.insert(id, connection);
        tracing::trace!(connection_id = %id, total = self.connections.len(), "Connection inserted");
        Ok(())
    }

    /// Remove a connection
    ///
    /// Removing an id that is not present is a no-op and returns `None`.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection<S>> {
        let mut connection = self.connections.remove(&id)?;
        connection.mark_closed();
        Some(connection)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection<S>> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection<S>> {
        self.connections.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ids of every connection in order
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Snapshot of every id except `excluded`
    ///
    /// Fan-out iterates this snapshot, so removals during a fan-out can neither
    /// skip nor corrupt the remaining targets.
    pub fn peers_of(&self, excluded: ConnectionId) -> Vec<ConnectionId> {
        self.connections
            .keys()
            .copied()
            .filter(|id| *id != excluded)
            .collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection<S>> {
        self.connections.values_mut()
    }
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedStream;

    fn add(registry: &mut ConnectionRegistry<ScriptedStream>) -> ConnectionId {
        let id = registry.allocate_id();
        let mut conn = Connection::new(id, ScriptedStream::new(), None);
        conn.activate();
        registry.insert(conn).unwrap();
        id
    }

    #[test]
    fn test_insert_and_remove() {
        let mut registry = ConnectionRegistry::new();
        let a = add(&mut registry);
        let b = add(&mut registry);

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(a));

        let removed = registry.remove(a).unwrap();
        assert_eq!(removed.state(), ConnectionState::Closed);
        assert!(!registry.contains(a));
        assert_eq!(registry.ids(), vec![b]);
    }

    #[test]
    fn test_double_remove_is_noop() {
        let mut registry = ConnectionRegistry::new();
        let a = add(&mut registry);

        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut registry = ConnectionRegistry::new();
        let a = add(&mut registry);
        registry.remove(a);
        let b = add(&mut registry);

        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_rejects_duplicates_and_inactive() {
        let mut registry = ConnectionRegistry::new();
        let a = add(&mut registry);

        let mut dup = Connection::new(a, ScriptedStream::new(), None);
        dup.activate();
        assert_eq!(registry.insert(dup), Err(RegistryError::DuplicateId(a)));

        let id = registry.allocate_id();
        let pending = Connection::new(id, ScriptedStream::new(), None);
        assert_eq!(registry.insert(pending), Err(RegistryError::NotActive(id)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_peers_exclude_sender() {
        let mut registry = ConnectionRegistry::new();
        let a = add(&mut registry);
        let b = add(&mut registry);
        let c = add(&mut registry);

        assert_eq!(registry.peers_of(b), vec![a, c]);
        assert_eq!(registry.peers_of(a), vec![b, c]);
    }

    #[test]
    fn test_accounting_after_connects_and_disconnects() {
        let mut registry = ConnectionRegistry::new();
        let ids: Vec<_> = (0..7).map(|_| add(&mut registry)).collect();

        for id in ids.iter().step_by(2) {
            registry.remove(*id);
        }
        // Repeat removals must not change the count
        registry.remove(ids[0]);

        assert_eq!(registry.len(), 3);
        let remaining = registry.ids();
        assert_eq!(remaining, vec![ids[1], ids[3], ids[5]]);
    }
}
