//! Common types and abstractions
//!
//! This module defines the core types used throughout the crate:
//! - Stream: unified async I/O abstraction
//! - Address: tunnel target representation
//! - Network: transport family requested by a dialer's caller
//! - format_bytes: human-readable byte quantities

mod address;
mod stream;
mod units;

pub use address::{Address, MAX_DOMAIN_LEN};
pub use stream::{AsyncReadWrite, IntoStream, Stream};
pub use units::format_bytes;

// Re-export error types from crate root
pub use crate::error::{Error, Result};

use tokio::sync::watch;

/// Resolve once `shutdown` holds `true` or its sender is gone.
///
/// The borrow taken by `wait_for` is released before returning, so the
/// future stays `Send` when used as a `select!` branch.
pub async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Network type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Tcp,
    Udp,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Udp => write!(f, "udp"),
        }
    }
}
