//! Relay event loop
//!
//! One thread, one blocking wait. Every wake-up is dispatched in the order the
//! notifier reports events:
//!
//! 1. Listener readable: accept the whole backlog.
//! 2. Connection writable: flush its outbound queue.
//! 3. Connection readable: drain it, fanning each chunk out as it is read.
//! 4. After every event, remove the connections marked for closing, so no
//!    later event or broadcast in the same wake-up can touch them.
//!
//! All sockets are non-blocking, so the wait is the only place the thread
//! ever suspends. Per-connection failures end in removal; only a failing
//! notifier ends the loop with an error.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::TcpStream;

use crate::error::{CloseReason, Error, Result};
use crate::io::{Broadcaster, DrainOutcome, Drainer, FlushResult, Notifier, ReadyEvent};
use crate::registry::{ConnectionId, ConnectionRegistry, LISTENER, WAKER};
use crate::server::config::RelayConfig;
use crate::server::listener::Acceptor;
use crate::server::shutdown::ShutdownHandle;
use crate::stats::RelayStats;

/// Longest single wait while flushing output during shutdown
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// State of the loop after a dispatch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Keep waiting for events
    Running,
    /// Shutdown was requested; the caller should stop looping
    ShuttingDown,
}

/// Broadcast relay server
///
/// Owns the listener, the readiness notifier and the connection registry.
/// Nothing is shared with other threads except [`ShutdownHandle`] and the
/// statistics counters.
pub struct RelayServer {
    config: RelayConfig,
    notifier: Notifier,
    acceptor: Acceptor,
    registry: ConnectionRegistry<TcpStream>,
    drainer: Drainer,
    broadcaster: Broadcaster,
    stats: Arc<RelayStats>,
    shutdown: Arc<AtomicBool>,
    closing: Vec<(ConnectionId, CloseReason)>,
}

impl RelayServer {
    /// Bind the listener and create the notifier
    pub fn bind(config: RelayConfig) -> Result<Self> {
        let mut notifier = Notifier::new(config.event_capacity).map_err(Error::Notifier)?;
        let mut acceptor = Acceptor::bind(&config)?;
        acceptor.register(&mut notifier).map_err(Error::Notifier)?;

        Ok(Self {
            drainer: Drainer::new(config.read_buffer_size),
            broadcaster: Broadcaster::new(config.max_pending_output),
            config,
            notifier,
            acceptor,
            registry: ConnectionRegistry::new(),
            stats: Arc::new(RelayStats::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            closing: Vec::new(),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Shared relay counters
    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Live connections
    pub fn registry(&self) -> &ConnectionRegistry<TcpStream> {
        &self.registry
    }

    /// Handle that stops [`RelayServer::run`] from any thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(Arc::clone(&self.shutdown), self.notifier.waker())
    }

    /// Run until shutdown is requested, then close every connection
    ///
    /// Returns an error only if the notifier fails.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!(addr = %self.local_addr(), "Relay running");

        while self.run_once(None)? == LoopState::Running {}

        self.graceful_shutdown();
        Ok(())
    }

    /// Wait once (up to `timeout`, `None` = forever) and dispatch every event
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<LoopState> {
        if self.shutdown_requested() {
            return Ok(LoopState::ShuttingDown);
        }

        let events = self.notifier.wait(timeout).map_err(|e| {
            tracing::error!(error = %e, "Readiness wait failed");
            Error::Notifier(e)
        })?;

        for event in events {
            self.dispatch(event);
            self.reap();
        }

        if self.shutdown_requested() {
            Ok(LoopState::ShuttingDown)
        } else {
            Ok(LoopState::Running)
        }
    }

    /// Remove a connection: deregister, drop from the registry, close the socket
    ///
    /// Returns `false` if the connection was already gone.
    pub fn close(&mut self, id: ConnectionId, reason: CloseReason) -> bool {
        let Some(mut connection) = self.registry.remove(id) else {
            return false;
        };

        if let Err(e) = self
            .notifier
            .deregister(connection.stream_mut(), id.token())
        {
            tracing::debug!(connection_id = %id, error = %e, "Failed to deregister connection");
        }

        self.stats.record_closed();
        match reason {
            CloseReason::ReadFault(_) => self.stats.record_read_fault(),
            CloseReason::WriteFault(_) | CloseReason::Registration(_) => {
                self.stats.record_write_fault()
            }
            CloseReason::Overflow => self.stats.record_slow_consumer(),
            CloseReason::PeerClosed | CloseReason::Shutdown => {}
        }

        let conn_stats = connection.stats();
        if reason.is_fault() {
            tracing::warn!(
                connection_id = %id,
                peer = ?connection.peer_addr(),
                reason = %reason,
                bytes_received = conn_stats.bytes_received,
                bytes_sent = conn_stats.bytes_sent,
                "Client dropped"
            );
        } else {
            tracing::info!(
                connection_id = %id,
                peer = ?connection.peer_addr(),
                reason = %reason,
                bytes_received = conn_stats.bytes_received,
                bytes_sent = conn_stats.bytes_sent,
                duration_ms = conn_stats.duration().as_millis() as u64,
                "Client disconnected"
            );
        }

        true
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn dispatch(&mut self, event: ReadyEvent) {
        match event.token {
            LISTENER => {
                let summary = self.acceptor.accept_pending(
                    &mut self.notifier,
                    &mut self.registry,
                    &self.config,
                    &self.stats,
                );
                if summary.interrupted_by_error {
                    tracing::warn!(
                        accepted = summary.accepted.len(),
                        "Accept drain stopped early, waiting for the next wake-up"
                    );
                }
                tracing::debug!(
                    accepted = summary.accepted.len(),
                    rejected = summary.rejected,
                    active = self.registry.len(),
                    "Accept backlog drained"
                );
            }
            WAKER => tracing::debug!("Event loop woken"),
            token => match ConnectionId::from_token(token) {
                Some(id) if self.registry.contains(id) => self.handle_connection_event(id, event),
                _ => tracing::trace!(token = token.0, "Event for unknown connection ignored"),
            },
        }
    }

    fn handle_connection_event(&mut self, id: ConnectionId, event: ReadyEvent) {
        if event.error {
            let pending_error = match self.registry.get(id) {
                Some(connection) => connection.stream().take_error(),
                None => return,
            };
            match pending_error {
                Ok(Some(e)) | Err(e) => {
                    self.mark_closing(id, CloseReason::from_read_error(&e));
                    return;
                }
                Ok(None) => {}
            }
        }

        if event.writable {
            self.flush(id);
        }

        if event.readable || event.read_closed {
            self.read(id);
        }
    }

    /// Drain a readable connection, broadcasting each chunk immediately
    fn read(&mut self, id: ConnectionId) {
        let mut blocked = Vec::new();

        let Self {
            drainer,
            registry,
            broadcaster,
            stats,
            closing,
            ..
        } = self;

        let outcome = drainer.drain(registry, id, |registry, sender, chunk| {
            stats.record_received(chunk.len());
            let fan_out = broadcaster.fan_out(registry, sender, &chunk);
            stats.record_relayed(chunk.len(), fan_out.delivered());
            blocked.extend(fan_out.newly_blocked);
            closing.extend(fan_out.closed);
        });

        for target in blocked {
            self.sync_interest(target);
        }

        match outcome {
            DrainOutcome::Drained { .. } => {}
            DrainOutcome::PeerClosed { .. } => self.mark_closing(id, CloseReason::PeerClosed),
            DrainOutcome::ReadFault(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Read failed");
                self.mark_closing(id, CloseReason::from_read_error(&e));
            }
        }
    }

    /// Write queued output after a writable event
    fn flush(&mut self, id: ConnectionId) {
        let Some(connection) = self.registry.get_mut(id) else {
            return;
        };
        if !connection.has_pending_output() {
            return;
        }

        match connection.flush_pending() {
            Ok(FlushResult::Complete { bytes_written }) => {
                tracing::trace!(connection_id = %id, bytes_written, "Outbound queue drained");
                self.sync_interest(id);
            }
            Ok(_) => {}
            Err(reason) => self.mark_closing(id, reason),
        }
    }

    /// Match the registered interest to the connection's outbound state
    fn sync_interest(&mut self, id: ConnectionId) {
        let Some(connection) = self.registry.get_mut(id) else {
            return;
        };
        if !connection.state().can_receive() {
            return;
        }

        let desired = connection.desired_interest();
        if desired == connection.interest() {
            return;
        }

        match self
            .notifier
            .reregister(connection.stream_mut(), id.token(), desired)
        {
            Ok(()) => connection.set_interest(desired),
            Err(e) => {
                connection.mark_closing();
                self.closing.push((id, CloseReason::Registration(e.kind())));
            }
        }
    }

    fn mark_closing(&mut self, id: ConnectionId, reason: CloseReason) {
        if let Some(connection) = self.registry.get_mut(id) {
            connection.mark_closing();
        }
        self.closing.push((id, reason));
    }

    /// Remove everything marked during the last dispatch step
    fn reap(&mut self) {
        for (id, reason) in std::mem::take(&mut self.closing) {
            self.close(id, reason);
        }
    }

    /// Stop accepting, give queued output a chance to drain, close everything
    fn graceful_shutdown(&mut self) {
        tracing::info!(connections = self.registry.len(), "Shutting down relay");

        if let Err(e) = self.acceptor.deregister(&mut self.notifier) {
            tracing::debug!(error = %e, "Failed to deregister listener");
        }

        for connection in self.registry.iter_mut() {
            connection.mark_closing();
        }

        // A grace period too large to represent waits for every queue to drain
        let deadline = Instant::now().checked_add(self.config.shutdown_grace);
        loop {
            let mut pending = false;
            for connection in self.registry.iter_mut() {
                if !connection.has_pending_output() {
                    continue;
                }
                match connection.flush_pending() {
                    Ok(FlushResult::Complete { .. }) => {}
                    Ok(_) => pending = true,
                    Err(reason) => self.closing.push((connection.id(), reason)),
                }
            }
            self.reap();

            let now = Instant::now();
            if !pending || deadline.is_some_and(|deadline| now >= deadline) {
                break;
            }

            // Writable interest is still registered for blocked connections
            let timeout = deadline.map_or(SHUTDOWN_POLL_INTERVAL, |deadline| {
                (deadline - now).min(SHUTDOWN_POLL_INTERVAL)
            });
            if let Err(e) = self.notifier.wait(Some(timeout)) {
                tracing::debug!(error = %e, "Wait failed during shutdown");
                break;
            }
        }

        for id in self.registry.ids() {
            self.close(id, CloseReason::Shutdown);
        }

        tracing::info!("Relay shutdown complete");
    }
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("addr", &self.local_addr())
            .field("connections", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpStream as StdTcpStream;

    use super::*;

    const TICK: Option<Duration> = Some(Duration::from_millis(20));

    fn server() -> RelayServer {
        let config = RelayConfig::with_addr("127.0.0.1:0".parse().unwrap());
        RelayServer::bind(config).unwrap()
    }

    fn connect(server: &RelayServer) -> StdTcpStream {
        let stream = StdTcpStream::connect(server.local_addr()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    /// Drive the loop until `done` holds or a few seconds pass
    fn pump_until(server: &mut RelayServer, mut done: impl FnMut(&RelayServer) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(server) {
            assert!(Instant::now() < deadline, "condition not reached");
            server.run_once(TICK).unwrap();
        }
    }

    #[test]
    fn test_relay_between_two_clients() {
        let mut server = server();
        let mut a = connect(&server);
        let mut b = connect(&server);
        pump_until(&mut server, |s| s.registry().len() == 2);

        a.write_all(b"ping").unwrap();
        let stats = server.stats();
        pump_until(&mut server, |_| stats.snapshot().chunks_relayed >= 1);

        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_disconnect_removes_connection() {
        let mut server = server();
        let a = connect(&server);
        let _b = connect(&server);
        pump_until(&mut server, |s| s.registry().len() == 2);

        drop(a);
        pump_until(&mut server, |s| s.registry().len() == 1);

        let snapshot = server.stats().snapshot();
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.closed, 1);
        assert_eq!(snapshot.active, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut server = server();
        let _a = connect(&server);
        pump_until(&mut server, |s| s.registry().len() == 1);

        let id = server.registry().ids()[0];
        assert!(server.close(id, CloseReason::PeerClosed));
        assert!(!server.close(id, CloseReason::PeerClosed));
        assert!(server.registry().is_empty());
        assert_eq!(server.stats().snapshot().closed, 1);
    }

    #[test]
    fn test_shutdown_handle_stops_loop() {
        let mut server = server();
        let handle = server.shutdown_handle();
        assert!(!handle.is_requested());

        handle.shutdown();
        assert!(handle.is_requested());
        assert_eq!(server.run_once(None).unwrap(), LoopState::ShuttingDown);
        assert!(server.run().is_ok());
    }

    #[test]
    fn test_unbounded_shutdown_grace() {
        let config = RelayConfig::with_addr("127.0.0.1:0".parse().unwrap())
            .shutdown_grace(Duration::from_secs(u64::MAX));
        let mut server = RelayServer::bind(config).unwrap();
        let mut client = connect(&server);
        pump_until(&mut server, |s| s.registry().len() == 1);

        server.shutdown_handle().shutdown();
        assert!(server.run().is_ok());
        assert!(server.registry().is_empty());

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_reset_client_removed_others_keep_relaying() {
        let mut server = server();
        let mut a = connect(&server);
        let b = connect(&server);
        let mut c = connect(&server);
        pump_until(&mut server, |s| s.registry().len() == 3);

        // Zero linger turns the close into a reset
        socket2::SockRef::from(&b)
            .set_linger(Some(Duration::ZERO))
            .unwrap();
        drop(b);
        pump_until(&mut server, |s| s.registry().len() == 2);

        let snapshot = server.stats().snapshot();
        assert_eq!(snapshot.closed, 1);
        assert_eq!(snapshot.read_faults, 0);

        a.write_all(b"still").unwrap();
        let stats = server.stats();
        pump_until(&mut server, |_| stats.snapshot().chunks_relayed >= 1);

        let mut buf = [0u8; 5];
        c.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"still");
        assert_eq!(server.stats().snapshot().write_faults, 0);
    }
}
