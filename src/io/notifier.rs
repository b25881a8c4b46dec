//! Readiness notifier
//!
//! Thin wrapper over `mio::Poll`. mio is edge-triggered: an event is reported
//! once per transition to ready, so every consumer must drain its socket until
//! `WouldBlock` before waiting again.

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use mio::event::{Event, Source};
use mio::{Events, Interest, Poll, Token, Waker};

use crate::registry::WAKER;

/// One readiness report from [`Notifier::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    /// The socket has a pending error (surfaced by the next read or `take_error`)
    pub error: bool,
    /// The peer shut down its write half
    pub read_closed: bool,
}

impl From<&Event> for ReadyEvent {
    fn from(event: &Event) -> Self {
        Self {
            token: event.token(),
            readable: event.is_readable(),
            writable: event.is_writable(),
            error: event.is_error(),
            read_closed: event.is_read_closed(),
        }
    }
}

/// OS readiness facility plus a cross-thread waker
pub struct Notifier {
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
    registered: HashSet<Token>,
}

impl Notifier {
    /// Create the poll instance; `event_capacity` bounds events per wait
    pub fn new(event_capacity: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(event_capacity.max(1)),
            waker,
            registered: HashSet::new(),
        })
    }

    /// Start watching `source` for `interest`
    pub fn register<S>(
        &mut self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().register(source, token, interest)?;
        self.registered.insert(token);
        Ok(())
    }

    /// Replace the interest set of an already registered source
    pub fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().reregister(source, token, interest)
    }

    /// Stop watching the source registered under `token`
    ///
    /// Deregistering a source that is not registered succeeds.
    pub fn deregister<S>(&mut self, source: &mut S, token: Token) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        if !self.registered.remove(&token) {
            tracing::trace!(token = token.0, "Deregister of unregistered source ignored");
            return Ok(());
        }

        match self.poll.registry().deregister(source) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::trace!("Deregister of unregistered source ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Block until something is ready or `timeout` elapses (`None` waits forever)
    ///
    /// A signal interrupting the wait yields an empty set rather than an error.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<ReadyEvent>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        Ok(self.events.iter().map(ReadyEvent::from).collect())
    }

    /// Whether a source is currently registered under `token`
    pub fn is_registered(&self, token: Token) -> bool {
        self.registered.contains(&token)
    }

    /// Waker that interrupts [`Notifier::wait`] from another thread
    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("capacity", &self.events.capacity())
            .field("registered", &self.registered.len())
            .finish()
    }
}
