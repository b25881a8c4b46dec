//! Statistics and metrics for relay connections

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Connection-level statistics
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    /// Total bytes read from the peer
    pub bytes_received: u64,
    /// Total bytes written to the peer
    pub bytes_sent: u64,
    /// Number of chunks read from the peer (one per successful read call)
    pub chunks_received: u64,
    /// Number of chunks relayed to the peer
    pub chunks_sent: u64,
    /// When the connection was accepted
    pub connected_at: Instant,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self {
            bytes_received: 0,
            bytes_sent: 0,
            chunks_received: 0,
            chunks_sent: 0,
            connected_at: Instant::now(),
        }
    }

    /// Time since the connection was accepted
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub(crate) fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.chunks_received += 1;
    }

    pub(crate) fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Relay-wide counters
///
/// Written only by the event loop thread; other threads may read them through
/// an `Arc` for monitoring. Relaxed ordering is enough since no counter guards
/// other memory.
#[derive(Debug, Default)]
pub struct RelayStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    closed: AtomicU64,
    active: AtomicUsize,
    bytes_received: AtomicU64,
    bytes_relayed: AtomicU64,
    chunks_relayed: AtomicU64,
    read_faults: AtomicU64,
    write_faults: AtomicU64,
    slow_consumers: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_relayed(&self, bytes: usize, targets: usize) {
        self.chunks_relayed.fetch_add(1, Ordering::Relaxed);
        self.bytes_relayed
            .fetch_add((bytes * targets) as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_read_fault(&self) {
        self.read_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_fault(&self) {
        self.write_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_slow_consumer(&self) {
        self.slow_consumers.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of connections currently in the registry
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Copy every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
            chunks_relayed: self.chunks_relayed.load(Ordering::Relaxed),
            read_faults: self.read_faults.load(Ordering::Relaxed),
            write_faults: self.write_faults.load(Ordering::Relaxed),
            slow_consumers: self.slow_consumers.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Connections accepted and registered
    pub accepted: u64,
    /// Connections dropped at accept time (limit reached, setup failed)
    pub rejected: u64,
    /// Connections removed from the registry
    pub closed: u64,
    /// Connections currently registered
    pub active: usize,
    /// Bytes read from all clients
    pub bytes_received: u64,
    /// Bytes handed to targets (sent or queued), summed over targets
    pub bytes_relayed: u64,
    /// Chunks fanned out
    pub chunks_relayed: u64,
    /// Connections removed because a read failed
    pub read_faults: u64,
    /// Connections removed because a write failed
    pub write_faults: u64,
    /// Connections removed because their pending output overflowed
    pub slow_consumers: u64,
}
