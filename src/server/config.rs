//! Relay configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Default listening port
pub const DEFAULT_PORT: u16 = 12345;

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Listen backlog depth (pending, not yet accepted connections)
    pub backlog: u32,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Size of the read buffer; one read fills at most this many bytes
    pub read_buffer_size: usize,

    /// Maximum readiness events returned by one wait
    pub event_capacity: usize,

    /// Queued output allowed per connection before it is dropped as a slow
    /// consumer (0 = any write that would block drops the connection)
    pub max_pending_output: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// How long shutdown waits for queued output to flush
    pub shutdown_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            backlog: 128,
            max_connections: 0, // Unlimited
            read_buffer_size: 4 * 1024,
            event_capacity: 256,
            max_pending_output: 8 * 1024 * 1024, // 8MB
            tcp_nodelay: true,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl RelayConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the listen backlog
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog.max(1);
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set read buffer size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set readiness events per wait
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set the per-connection pending output limit
    pub fn max_pending_output(mut self, bytes: usize) -> Self {
        self.max_pending_output = bytes;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set the shutdown flush grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.backlog, 128);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.max_pending_output, 8 * 1024 * 1024);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = RelayConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_zero_sizes_are_clamped() {
        let config = RelayConfig::default()
            .backlog(0)
            .read_buffer_size(0)
            .event_capacity(0);

        assert_eq!(config.backlog, 1);
        assert_eq!(config.read_buffer_size, 1);
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = RelayConfig::default()
            .bind(addr)
            .backlog(16)
            .max_connections(50)
            .read_buffer_size(1024)
            .max_pending_output(0)
            .tcp_nodelay(false)
            .shutdown_grace(Duration::from_millis(250));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.backlog, 16);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.max_pending_output, 0);
        assert!(!config.tcp_nodelay);
        assert_eq!(config.shutdown_grace, Duration::from_millis(250));
    }
}
