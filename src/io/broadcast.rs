//! Broadcaster
//!
//! Fans one chunk out to every registered connection except its sender. The
//! target set is snapshotted before the first write, and failed targets are
//! only marked `Closing`; the caller removes them once the fan-out returns.
//! A failing target therefore never stops delivery to the rest, and the sender
//! is never affected by a peer's failure.

use std::io::Write;

use bytes::Bytes;

use crate::error::CloseReason;
use crate::registry::{ConnectionId, ConnectionRegistry, Delivery};

/// Result of one fan-out
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOut {
    /// Targets that accepted the whole chunk
    pub sent: usize,
    /// Targets holding part of the chunk in their outbound queue
    pub queued: usize,
    /// Targets whose outbound queue just became non-empty (need write interest)
    pub newly_blocked: Vec<ConnectionId>,
    /// Targets that failed, now marked `Closing`
    pub closed: Vec<(ConnectionId, CloseReason)>,
}

impl FanOut {
    /// Number of targets that received or queued the chunk
    pub fn delivered(&self) -> usize {
        self.sent + self.queued
    }
}

/// Writes chunks to every peer of the sender
#[derive(Debug, Clone)]
pub struct Broadcaster {
    max_pending_output: usize,
}

impl Broadcaster {
    /// `max_pending_output` caps queued bytes per target before it is dropped
    pub fn new(max_pending_output: usize) -> Self {
        Self { max_pending_output }
    }

    /// Send `chunk` to every active connection other than `sender`
    pub fn fan_out<S: Write>(
        &self,
        registry: &mut ConnectionRegistry<S>,
        sender: ConnectionId,
        chunk: &Bytes,
    ) -> FanOut {
        let mut result = FanOut::default();

        for target in registry.peers_of(sender) {
            let Some(connection) = registry.get_mut(target) else {
                continue;
            };
            if !connection.state().can_receive() {
                continue;
            }

            match connection.send(chunk, self.max_pending_output) {
                Delivery::Sent => result.sent += 1,
                Delivery::Queued { newly_blocked } => {
                    result.queued += 1;
                    if newly_blocked {
                        tracing::debug!(
                            connection_id = %target,
                            pending = connection.pending_output(),
                            "Target would block, output queued"
                        );
                        result.newly_blocked.push(target);
                    }
                }
                Delivery::Closed(reason) => {
                    connection.mark_closing();
                    result.closed.push((target, reason));
                }
            }
        }

        tracing::trace!(
            sender = %sender,
            len = chunk.len(),
            sent = result.sent,
            queued = result.queued,
            failed = result.closed.len(),
            "Chunk fanned out"
        );

        result
    }
}
