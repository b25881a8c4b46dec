//! Per-connection pending output
//!
//! When a broadcast write cannot complete immediately the unwritten remainder is
//! parked here and the connection gains write interest. Later chunks for the
//! same connection queue up behind it so the byte order seen by the peer always
//! matches the order chunks were relayed.

use std::collections::VecDeque;
use std::io::{self, Write};

use bytes::{Buf, Bytes};

/// Result of a flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushResult {
    /// Everything queued was written
    Complete { bytes_written: usize },
    /// The socket stopped accepting data; the rest stays queued
    WouldBlock { bytes_written: usize },
    /// The socket accepted zero bytes, the peer is gone
    Closed,
}

/// FIFO of byte chunks waiting to be written
#[derive(Debug, Default)]
pub struct OutboundQueue {
    chunks: VecDeque<Bytes>,
    len: usize,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing is waiting to be written
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total queued bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of queued chunks (the front one may be partially written)
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Append a chunk behind everything already queued
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Write as much as possible, stopping at `WouldBlock`
    pub fn try_flush<W: Write>(&mut self, writer: &mut W) -> io::Result<FlushResult> {
        let mut bytes_written = 0;

        while let Some(front) = self.chunks.front_mut() {
            match writer.write(front) {
                Ok(0) => return Ok(FlushResult::Closed),
                Ok(n) => {
                    front.advance(n);
                    self.len -= n;
                    bytes_written += n;
                    if front.is_empty() {
                        self.chunks.pop_front();
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FlushResult::WouldBlock { bytes_written });
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(FlushResult::Complete { bytes_written })
    }

    /// Drop everything queued
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }
}
