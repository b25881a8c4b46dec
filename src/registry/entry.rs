//! Connection entry and state types
//!
//! This module defines the per-connection state stored in the registry.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use bytes::Bytes;
use mio::Interest;

use crate::error::CloseReason;
use crate::io::outbound::{FlushResult, OutboundQueue};
use crate::stats::ConnectionStats;

use super::id::ConnectionId;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted and configured, not yet registered
    Accepted,
    /// Registered, readable, eligible as a broadcast target
    Active,
    /// A close or fault was detected, removal pending
    Closing,
    /// Removed from the registry
    Closed,
}

impl ConnectionState {
    /// Whether reads should be issued
    pub fn can_read(&self) -> bool {
        matches!(self, ConnectionState::Active)
    }

    /// Whether the connection may receive broadcast data
    pub fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Active)
    }
}

/// Outcome of handing a chunk to one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written in full
    Sent,
    /// Some or all of the chunk is queued for a later writable event
    ///
    /// `newly_blocked` is set when the queue was empty before this chunk, i.e.
    /// the connection now needs write interest.
    Queued { newly_blocked: bool },
    /// The target failed and must be removed
    Closed(CloseReason),
}

/// A single client connection
#[derive(Debug)]
pub struct Connection<S> {
    id: ConnectionId,
    stream: S,
    peer_addr: Option<SocketAddr>,
    state: ConnectionState,
    interest: Interest,
    outbound: OutboundQueue,
    stats: ConnectionStats,
}

impl<S> Connection<S> {
    /// Wrap a freshly accepted stream
    pub fn new(id: ConnectionId, stream: S, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            stream,
            peer_addr,
            state: ConnectionState::Accepted,
            interest: Interest::READABLE,
            outbound: OutboundQueue::new(),
            stats: ConnectionStats::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Interest currently registered with the notifier
    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub(crate) fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }

    /// Interest the connection should be registered with right now
    pub fn desired_interest(&self) -> Interest {
        if self.outbound.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    /// Bytes waiting for a writable event
    pub fn pending_output(&self) -> usize {
        self.outbound.len()
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Mark as registered and live
    pub(crate) fn activate(&mut self) {
        self.state = ConnectionState::Active;
    }

    /// Mark for removal at the end of the current dispatch step
    pub(crate) fn mark_closing(&mut self) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Closing;
        }
    }

    pub(crate) fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
        self.outbound.clear();
    }
}

impl<S: Read> Connection<S> {
    /// Issue one read into `buf`
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stream.read(buf)?;
        if n > 0 {
            self.stats.record_received(n);
        }
        Ok(n)
    }
}

impl<S: Write> Connection<S> {
    /// Hand a broadcast chunk to this connection
    ///
    /// The chunk is written immediately when nothing is queued. If the socket
    /// would block, the remainder is queued. While a queue exists new chunks
    /// only append, preserving order. Exceeding `max_pending` bytes of queued
    /// output closes the connection as a slow consumer.
    pub fn send(&mut self, chunk: &Bytes, max_pending: usize) -> Delivery {
        if self.has_pending_output() {
            if self.outbound.len() + chunk.len() > max_pending {
                return Delivery::Closed(CloseReason::Overflow);
            }
            self.outbound.push(chunk.clone());
            self.stats.chunks_sent += 1;
            return Delivery::Queued {
                newly_blocked: false,
            };
        }

        self.outbound.push(chunk.clone());
        match self.outbound.try_flush(&mut self.stream) {
            Ok(FlushResult::Complete { bytes_written }) => {
                self.stats.record_sent(bytes_written);
                self.stats.chunks_sent += 1;
                Delivery::Sent
            }
            Ok(FlushResult::WouldBlock { bytes_written }) => {
                self.stats.record_sent(bytes_written);
                if self.outbound.len() > max_pending {
                    return Delivery::Closed(CloseReason::Overflow);
                }
                self.stats.chunks_sent += 1;
                Delivery::Queued {
                    newly_blocked: true,
                }
            }
            Ok(FlushResult::Closed) => Delivery::Closed(CloseReason::PeerClosed),
            Err(e) => Delivery::Closed(CloseReason::from_write_error(&e)),
        }
    }

    /// Write queued output after a writable event
    pub fn flush_pending(&mut self) -> Result<FlushResult, CloseReason> {
        match self.outbound.try_flush(&mut self.stream) {
            Ok(FlushResult::Closed) => Err(CloseReason::PeerClosed),
            Ok(result @ FlushResult::Complete { bytes_written })
            | Ok(result @ FlushResult::WouldBlock { bytes_written }) => {
                self.stats.record_sent(bytes_written);
                Ok(result)
            }
            Err(e) => Err(CloseReason::from_write_error(&e)),
        }
    }
}
