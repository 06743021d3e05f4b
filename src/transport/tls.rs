//! TLS client layer for HTTPS targets

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::rustls::{pki_types::ServerName, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::common::{Result, Stream};
use crate::error::Error;

/// Wraps established streams in client-side TLS, verified against the
/// bundled web PKI roots.
#[derive(Clone)]
pub struct TlsClient {
    connector: TlsConnector,
}

impl TlsClient {
    pub fn new() -> Self {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Self {
            connector: TlsConnector::from(Arc::new(config)),
        }
    }

    /// Run the TLS handshake over `stream` with `server_name` as SNI.
    pub async fn wrap(&self, stream: Stream, server_name: &str) -> Result<Stream> {
        let domain = ServerName::try_from(server_name.to_string())
            .map_err(|_| Error::InvalidUrl(format!("invalid TLS server name: {}", server_name)))?;

        let tls_stream = self.connector.connect(domain, BoxedStream(stream)).await?;
        Ok(Box::new(tls_stream))
    }
}

impl Default for TlsClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets a boxed Stream satisfy tokio-rustls' sized bounds
struct BoxedStream(Stream);

impl AsyncRead for BoxedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for BoxedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut *self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.0).poll_shutdown(cx)
    }
}
