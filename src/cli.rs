//! Command-line interface for the `relay` binary

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::server::config::{RelayConfig, DEFAULT_PORT};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
    pub listen: SocketAddr,

    /// Listen backlog depth.
    #[arg(long, default_value_t = 128)]
    pub backlog: u32,

    /// Read buffer size in bytes; bounds the size of one relayed chunk.
    #[arg(long, default_value_t = 4096)]
    pub read_buffer: usize,

    /// Maximum concurrent clients (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    pub max_connections: usize,

    /// Bytes of queued output a slow client may accumulate before it is dropped.
    #[arg(long, default_value_t = 8 * 1024 * 1024)]
    pub max_pending: usize,

    /// Seconds to spend flushing queued output on shutdown.
    #[arg(long, default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    /// Leave Nagle's algorithm enabled on client sockets.
    #[arg(long)]
    pub no_nodelay: bool,
}

impl Cli {
    /// Build the relay configuration from the parsed arguments
    pub fn to_config(&self) -> RelayConfig {
        RelayConfig::with_addr(self.listen)
            .backlog(self.backlog)
            .read_buffer_size(self.read_buffer)
            .max_connections(self.max_connections)
            .max_pending_output(self.max_pending)
            .shutdown_grace(Duration::from_secs(self.shutdown_grace_secs))
            .tcp_nodelay(!self.no_nodelay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["relay"]).unwrap();
        let config = cli.to_config();
        let defaults = RelayConfig::default();

        assert_eq!(config.bind_addr, defaults.bind_addr);
        assert_eq!(config.backlog, defaults.backlog);
        assert_eq!(config.read_buffer_size, defaults.read_buffer_size);
        assert_eq!(config.max_pending_output, defaults.max_pending_output);
        assert_eq!(config.shutdown_grace, defaults.shutdown_grace);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "relay",
            "--listen",
            "127.0.0.1:8080",
            "--backlog",
            "10",
            "--read-buffer",
            "1024",
            "--max-connections",
            "3",
            "--max-pending",
            "0",
            "--no-nodelay",
        ])
        .unwrap();
        let config = cli.to_config();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.backlog, 10);
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.max_pending_output, 0);
        assert!(!config.tcp_nodelay);
    }

    #[test]
    fn test_rejects_bad_address() {
        assert!(Cli::try_parse_from(["relay", "--listen", "not-an-addr"]).is_err());
    }
}
