//! health-node - drives an external V2Ray/Xray core for outbound health checks
//!
//! # Architecture
//!
//! ```text
//! supervisor  start core → wait for inbound → stop
//! protocol    SOCKS5 client handshake
//! transport   TCP / SOCKS5 tunnel / TLS streams
//! harness     HTTP probe and speed test over a transport
//! relay       metered local TCP relay in front of the core
//! app         probe, speed and proxy runs
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── common/          # Core types: Stream, Address, byte units
//! ├── protocol/        # SOCKS5 client
//! ├── transport/       # Transport layer: TCP, SOCKS5, TLS
//! ├── supervisor/      # Core process, runtime config, readiness
//! ├── harness/         # HTTP probe/speed
//! ├── relay/           # Metered relay, traffic reporter, metrics
//! └── app/             # Pipelines and metrics API
//! ```

// Core types
pub mod common;
pub mod error;

// Layered architecture
pub mod protocol;
pub mod transport;
pub mod supervisor;
pub mod harness;
pub mod relay;
pub mod app;

// Supporting modules
pub mod config;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports for convenience
pub use common::{Address, Network, Stream};
pub use config::NodeConfig;
pub use error::{Error, Result, SocksError};

pub use harness::{HttpClient, ProbeReport, SpeedReport};
pub use protocol::Socks5Client;
pub use relay::{RelaySession, TrafficCounters, TrafficReporter};
pub use supervisor::{CoreProcess, CoreRunner, OutboundDescriptor, ReadinessPoller};
pub use transport::Transport;
