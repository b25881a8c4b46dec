//! Connection and relay statistics

pub mod metrics;

pub use metrics::{ConnectionStats, RelayStats, StatsSnapshot};
