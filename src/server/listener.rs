//! Relay listener
//!
//! Owns the listening socket and drains its accept backlog. mio reports the
//! listener readable once per burst of arrivals, so every wake-up accepts until
//! `WouldBlock`; stopping early would strand queued connections until the next
//! unrelated arrival.

use std::io;
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};
use mio::Interest;
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{Error, Result};
use crate::io::Notifier;
use crate::registry::{Connection, ConnectionId, ConnectionRegistry, LISTENER};
use crate::server::config::RelayConfig;
use crate::stats::RelayStats;

/// What one accept drain did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AcceptSummary {
    /// Connections registered, in accept order
    pub accepted: Vec<ConnectionId>,
    /// Connections dropped (limit reached, setup or registration failed)
    pub rejected: usize,
    /// Accepting stopped on an unexpected error rather than `WouldBlock`
    pub interrupted_by_error: bool,
}

/// Listening socket plus accept loop
#[derive(Debug)]
pub struct Acceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Create, bind and listen on `config.bind_addr` with `config.backlog`
    pub fn bind(config: &RelayConfig) -> Result<Self> {
        let addr = config.bind_addr;
        let listener =
            bind_listener(addr, config.backlog).map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| Error::Bind { addr, source })?;

        tracing::info!(addr = %local_addr, backlog = config.backlog, "Relay listening");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register the listener under the reserved listener token
    pub fn register(&mut self, notifier: &mut Notifier) -> io::Result<()> {
        notifier.register(&mut self.listener, LISTENER, Interest::READABLE)
    }

    /// Stop receiving accept readiness
    pub fn deregister(&mut self, notifier: &mut Notifier) -> io::Result<()> {
        notifier.deregister(&mut self.listener, LISTENER)
    }

    /// Accept every pending connection
    ///
    /// Each socket is configured, inserted into the registry and registered
    /// for read readiness. A socket that fails any step is dropped (closing
    /// it) and the drain continues with the rest of the backlog.
    pub fn accept_pending(
        &mut self,
        notifier: &mut Notifier,
        registry: &mut ConnectionRegistry<TcpStream>,
        config: &RelayConfig,
        stats: &RelayStats,
    ) -> AcceptSummary {
        let listener = &self.listener;
        drain_backlog(
            || listener.accept(),
            prepare_socket,
            notifier,
            registry,
            config,
            stats,
        )
    }
}

/// Accept until the backlog is empty or accepting fails outright
///
/// `prepare` applies per-socket options before registration; a socket it
/// rejects is closed without affecting the rest of the backlog.
fn drain_backlog<A, P>(
    mut accept: A,
    mut prepare: P,
    notifier: &mut Notifier,
    registry: &mut ConnectionRegistry<TcpStream>,
    config: &RelayConfig,
    stats: &RelayStats,
) -> AcceptSummary
where
    A: FnMut() -> io::Result<(TcpStream, SocketAddr)>,
    P: FnMut(&TcpStream, &RelayConfig) -> io::Result<()>,
{
    let mut summary = AcceptSummary::default();

    loop {
        let (stream, peer_addr) = match accept() {
            Ok(pair) => pair,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
                ) =>
            {
                tracing::warn!(error = %e, "Transient accept error");
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept connection");
                summary.interrupted_by_error = true;
                break;
            }
        };

        if config.max_connections > 0 && registry.len() >= config.max_connections {
            tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
            stats.record_rejected();
            summary.rejected += 1;
            continue;
        }

        if let Err(e) = prepare(&stream, config) {
            tracing::warn!(peer = %peer_addr, error = %e, "Failed to configure connection");
            stats.record_rejected();
            summary.rejected += 1;
            continue;
        }

        match admit(stream, peer_addr, notifier, registry) {
            Ok(id) => {
                stats.record_accepted();
                tracing::info!(
                    connection_id = %id,
                    peer = %peer_addr,
                    active = registry.len(),
                    "Client connected"
                );
                summary.accepted.push(id);
            }
            Err(e) => {
                tracing::warn!(peer = %peer_addr, error = %e, "Failed to set up connection");
                stats.record_rejected();
                summary.rejected += 1;
            }
        }
    }

    summary
}

/// Socket options applied to every accepted connection
///
/// mio hands out accepted sockets already in non-blocking mode.
fn prepare_socket(stream: &TcpStream, config: &RelayConfig) -> io::Result<()> {
    if config.tcp_nodelay {
        stream.set_nodelay(true)?;
    }
    Ok(())
}

/// Insert one accepted socket and register it for read readiness
///
/// Insertion comes first so that a rejected insert never leaves a token
/// behind in the notifier; a failed registration removes the entry again,
/// closing the socket.
fn admit(
    stream: TcpStream,
    peer_addr: SocketAddr,
    notifier: &mut Notifier,
    registry: &mut ConnectionRegistry<TcpStream>,
) -> io::Result<ConnectionId> {
    let id = registry.allocate_id();
    let mut connection = Connection::new(id, stream, Some(peer_addr));
    connection.activate();

    registry
        .insert(connection)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let registered = match registry.get_mut(id) {
        Some(connection) => {
            notifier.register(connection.stream_mut(), id.token(), Interest::READABLE)
        }
        None => Err(io::Error::new(io::ErrorKind::NotFound, "connection vanished")),
    };
    if let Err(e) = registered {
        registry.remove(id);
        return Err(e);
    }

    Ok(id)
}

fn bind_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    // Allow quick restarts while old connections sit in TIME_WAIT
    #[cfg(not(windows))]
    socket.set_reuse_address(true)?;

    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;
    socket.set_nonblocking(true)?;

    Ok(TcpListener::from_std(socket.into()))
}
