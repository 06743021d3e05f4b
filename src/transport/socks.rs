//! Transport through a local SOCKS5 endpoint

use std::time::Duration;

use async_trait::async_trait;

use crate::common::{Address, IntoStream, Network, Result, Stream};
use crate::protocol::socks5::Socks5Client;

use super::{require_tcp, Transport};

/// Every connection becomes a CONNECT tunnel through the proxy
#[derive(Debug, Clone)]
pub struct Socks5Transport {
    client: Socks5Client,
}

impl Socks5Transport {
    pub fn new(proxy: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Socks5Client::new(proxy, timeout),
        }
    }
}

#[async_trait]
impl Transport for Socks5Transport {
    async fn connect(&self, network: Network, addr: &Address) -> Result<Stream> {
        require_tcp(network)?;
        let stream = self.client.connect_addr(addr).await?;
        Ok(stream.into_stream())
    }
}
