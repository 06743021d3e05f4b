//! Direct TCP transport

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::common::{Address, IntoStream, Network, Result, Stream};

use super::{require_tcp, Transport};

/// TCP transport - raw TCP connections
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }

    /// Dial returning the concrete stream, for callers that need half-close
    /// or socket options.
    pub async fn connect_tcp(&self, addr: &Address) -> Result<TcpStream> {
        let stream = match addr {
            Address::Socket(socket_addr) => TcpStream::connect(socket_addr).await?,
            Address::Domain(domain, port) => TcpStream::connect((domain.as_str(), *port)).await?,
        };

        // Disable Nagle's algorithm for lower latency
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, network: Network, addr: &Address) -> Result<Stream> {
        require_tcp(network)?;
        Ok(self.connect_tcp(addr).await?.into_stream())
    }
}
