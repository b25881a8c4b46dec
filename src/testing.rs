//! In-memory stream with scripted read/write behaviour
//!
//! Lets the drainer, broadcaster and outbound queue be exercised against
//! partial writes, `WouldBlock`, and peer failures without real sockets.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// Scripted outcome of one `read` call
#[derive(Debug)]
pub enum ReadStep {
    Data(Vec<u8>),
    Eof,
    Block,
    Fail(io::ErrorKind),
}

/// Scripted outcome of one `write` call
#[derive(Debug, Clone, Copy)]
pub enum WriteStep {
    /// Accept at most this many bytes
    Accept(usize),
    Block,
    Fail(io::ErrorKind),
}

/// Stream whose reads and writes follow a script
///
/// Once the read script runs out every read blocks. Once the write script
/// runs out every write accepts the whole buffer.
#[derive(Debug, Default)]
pub struct ScriptedStream {
    reads: VecDeque<ReadStep>,
    writes: VecDeque<WriteStep>,
    written: Vec<u8>,
    read_calls: usize,
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_read(mut self, step: ReadStep) -> Self {
        self.reads.push_back(step);
        self
    }

    pub fn on_write(mut self, step: WriteStep) -> Self {
        self.writes.push_back(step);
        self
    }

    /// Queue another write outcome after construction
    pub fn push_write(&mut self, step: WriteStep) {
        self.writes.push_back(step);
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_calls += 1;
        match self.reads.pop_front() {
            Some(ReadStep::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.reads.push_front(ReadStep::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Some(ReadStep::Eof) => Ok(0),
            Some(ReadStep::Fail(kind)) => Err(io::Error::from(kind)),
            Some(ReadStep::Block) | None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writes.pop_front() {
            Some(WriteStep::Accept(limit)) => {
                let n = limit.min(buf.len());
                self.written.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            Some(WriteStep::Block) => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Some(WriteStep::Fail(kind)) => Err(io::Error::from(kind)),
            None => {
                self.written.extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
