//! Transport layer
//!
//! Establishes byte streams to a target: directly over TCP, or through a
//! SOCKS5 tunnel. TLS is layered on top of whichever stream comes back.

mod socks;
mod tcp;
mod tls;

pub use socks::Socks5Transport;
pub use tcp::TcpTransport;
pub use tls::TlsClient;

use async_trait::async_trait;

use crate::common::{Address, Network, Result, Stream};
use crate::error::Error;

/// Establish a raw stream to a target address
#[async_trait]
pub trait Transport: Send + Sync {
    /// Only [`Network::Tcp`] is carried; other networks fail with
    /// [`Error::Unsupported`].
    async fn connect(&self, network: Network, addr: &Address) -> Result<Stream>;
}

fn require_tcp(network: Network) -> Result<()> {
    match network {
        Network::Tcp => Ok(()),
        other => Err(Error::Unsupported(format!("{} transport", other))),
    }
}
