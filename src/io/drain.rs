//! Connection drainer
//!
//! Under edge-triggered notification a readable connection must be read until
//! the socket reports `WouldBlock`; stopping after the first read would leave
//! bytes from a fast sender stranded until some unrelated event re-arms the
//! socket. Each successful read is handed to the sink immediately, so the
//! sender's read boundaries become separate broadcast events.

use std::io::{self, Read};

use bytes::Bytes;

use crate::registry::{ConnectionId, ConnectionRegistry};

/// Why draining stopped
#[derive(Debug)]
pub enum DrainOutcome {
    /// The socket has no more data for now; the connection stays registered
    Drained { chunks: usize, bytes: usize },
    /// The peer performed an orderly close
    PeerClosed { chunks: usize, bytes: usize },
    /// A read failed; the connection must be removed
    ReadFault(io::Error),
}

/// Reads readable connections into a reusable fixed-size buffer
#[derive(Debug)]
pub struct Drainer {
    buf: Vec<u8>,
}

impl Drainer {
    /// Create a drainer whose reads are at most `buffer_size` bytes
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buf: vec![0u8; buffer_size.max(1)],
        }
    }

    /// Drain connection `id`, calling `sink` once per successful read
    ///
    /// The sink receives the registry back so it can fan the chunk out to the
    /// other connections before the next read is issued. Unknown or inactive
    /// connections are skipped.
    pub fn drain<S, F>(
        &mut self,
        registry: &mut ConnectionRegistry<S>,
        id: ConnectionId,
        mut sink: F,
    ) -> DrainOutcome
    where
        S: Read,
        F: FnMut(&mut ConnectionRegistry<S>, ConnectionId, Bytes),
    {
        let mut chunks = 0;
        let mut bytes = 0;

        loop {
            let Some(connection) = registry.get_mut(id) else {
                return DrainOutcome::Drained { chunks, bytes };
            };
            if !connection.state().can_read() {
                return DrainOutcome::Drained { chunks, bytes };
            }

            match connection.read_chunk(&mut self.buf) {
                Ok(0) => return DrainOutcome::PeerClosed { chunks, bytes },
                Ok(n) => {
                    chunks += 1;
                    bytes += n;
                    tracing::trace!(connection_id = %id, len = n, "Read chunk");
                    let chunk = Bytes::copy_from_slice(&self.buf[..n]);
                    sink(registry, id, chunk);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return DrainOutcome::Drained { chunks, bytes };
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return DrainOutcome::ReadFault(e),
            }
        }
    }
}
