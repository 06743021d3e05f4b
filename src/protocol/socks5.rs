//! SOCKS5 client (RFC 1928, no authentication)
//!
//! Opens a CONNECT tunnel through a local SOCKS5 endpoint. The whole
//! handshake runs under one deadline; the returned stream carries no
//! deadline at all.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::common::Address;
use crate::error::SocksError;

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_NONE: u8 = 0x00;

const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REP_SUCCESS: u8 = 0x00;

type Result<T> = std::result::Result<T, SocksError>;

/// SOCKS5 client bound to one proxy endpoint
#[derive(Debug, Clone)]
pub struct Socks5Client {
    proxy: String,
    timeout: Duration,
}

impl Socks5Client {
    /// `timeout` bounds the dial and, separately, the handshake.
    /// A zero timeout means no deadline.
    pub fn new(proxy: impl Into<String>, timeout: Duration) -> Self {
        Self {
            proxy: proxy.into(),
            timeout,
        }
    }

    /// Open a tunnel to `target` (`host:port`).
    pub async fn connect(&self, target: &str) -> Result<TcpStream> {
        let target = Address::parse(target)?;
        self.connect_addr(&target).await
    }

    /// Open a tunnel to an already parsed target.
    ///
    /// On any failure the connection to the proxy is dropped before returning.
    pub async fn connect_addr(&self, target: &Address) -> Result<TcpStream> {
        let mut stream = self.dial().await?;
        trace!("SOCKS5 handshake via {} for {}", self.proxy, target);

        if self.timeout.is_zero() {
            handshake(&mut stream, target).await?;
        } else {
            tokio::time::timeout(self.timeout, handshake(&mut stream, target))
                .await
                .map_err(|_| SocksError::HandshakeTimeout(self.timeout))??;
        }

        debug!("SOCKS5 tunnel to {} via {} established", target, self.proxy);
        Ok(stream)
    }

    async fn dial(&self) -> Result<TcpStream> {
        let connect = TcpStream::connect(self.proxy.as_str());
        let result = if self.timeout.is_zero() {
            connect.await
        } else {
            tokio::time::timeout(self.timeout, connect)
                .await
                .map_err(|_| SocksError::DialTimeout {
                    addr: self.proxy.clone(),
                })?
        };

        let stream = result.map_err(|source| SocksError::Dial {
            addr: self.proxy.clone(),
            source,
        })?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }
}

/// Run the client side of the handshake on an open stream.
pub async fn handshake<S>(stream: &mut S, target: &Address) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // 1. Greeting: one method offered, "no auth"
    stream
        .write_all(&[SOCKS5_VERSION, 1, AUTH_NONE])
        .await
        .map_err(SocksError::GreetingWrite)?;

    let mut selected = [0u8; 2];
    stream
        .read_exact(&mut selected)
        .await
        .map_err(SocksError::GreetingRead)?;

    if selected != [SOCKS5_VERSION, AUTH_NONE] {
        return Err(SocksError::Negotiation {
            version: selected[0],
            method: selected[1],
        });
    }

    // 2. CONNECT request
    let request = encode_connect_request(target);
    stream
        .write_all(&request)
        .await
        .map_err(SocksError::ConnectWrite)?;

    // 3. Reply header
    let mut head = [0u8; 4];
    stream
        .read_exact(&mut head)
        .await
        .map_err(SocksError::ConnectRead)?;

    if head[0] != SOCKS5_VERSION {
        return Err(SocksError::ReplyVersion(head[0]));
    }
    if head[1] != REP_SUCCESS {
        return Err(SocksError::ConnectFailed { code: head[1] });
    }

    // 4. Discard bound address and port
    let skip = match head[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream
                .read_exact(&mut len)
                .await
                .map_err(SocksError::ReplyTailRead)?;
            len[0] as usize
        }
        other => return Err(SocksError::UnknownAddressType(other)),
    };

    let mut tail = vec![0u8; skip + 2];
    stream
        .read_exact(&mut tail)
        .await
        .map_err(SocksError::ReplyTailRead)?;

    Ok(())
}

/// Build `VER CMD RSV ATYP DST.ADDR DST.PORT` for a CONNECT.
pub fn encode_connect_request(target: &Address) -> Vec<u8> {
    let mut request = vec![SOCKS5_VERSION, CMD_CONNECT, 0x00];

    match target {
        Address::Socket(SocketAddr::V4(v4)) => {
            request.push(ATYP_IPV4);
            request.extend_from_slice(&v4.ip().octets());
        }
        Address::Socket(SocketAddr::V6(v6)) => {
            request.push(ATYP_IPV6);
            request.extend_from_slice(&v6.ip().octets());
        }
        Address::Domain(domain, _) => {
            request.push(ATYP_DOMAIN);
            request.push(domain.len() as u8);
            request.extend_from_slice(domain.as_bytes());
        }
    }

    request.extend_from_slice(&target.port().to_be_bytes());
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accept one connection on an ephemeral port and hand it to `serve`.
    async fn mock_proxy<F, Fut>(serve: F) -> (SocketAddr, JoinHandle<Fut::Output>)
    where
        F: FnOnce(TcpStream) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream).await
        });
        (addr, handle)
    }

    /// Accept the greeting, capture a request of `len` bytes, send `reply`,
    /// then echo four bytes so the caller can prove the tunnel works.
    async fn capture_request(mut s: TcpStream, len: usize, reply: Vec<u8>) -> Vec<u8> {
        let mut greeting = [0u8; 3];
        s.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting, [0x05, 0x01, 0x00]);
        s.write_all(&[0x05, 0x00]).await.unwrap();

        let mut request = vec![0u8; len];
        s.read_exact(&mut request).await.unwrap();
        s.write_all(&reply).await.unwrap();

        let mut echo = [0u8; 4];
        s.read_exact(&mut echo).await.unwrap();
        s.write_all(&echo).await.unwrap();
        request
    }

    fn client(addr: SocketAddr) -> Socks5Client {
        Socks5Client::new(addr.to_string(), Duration::from_secs(2))
    }

    async fn assert_echo(stream: &mut TcpStream) {
        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_encode_ipv6_request() {
        let target = Address::parse("[::1]:8080").unwrap();
        let request = encode_connect_request(&target);
        assert_eq!(&request[..4], &[0x05, 0x01, 0x00, 0x04]);
        assert_eq!(request.len(), 4 + 16 + 2);
        assert_eq!(request[19], 0x01);
        assert_eq!(&request[20..], &[0x1F, 0x90]);
    }

    #[tokio::test]
    async fn test_connect_ipv4_request_bytes() {
        let reply = vec![0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x1F, 0x90];
        let (addr, server) = mock_proxy(move |s| capture_request(s, 10, reply)).await;

        let mut stream = client(addr).connect("93.184.216.34:443").await.unwrap();
        assert_echo(&mut stream).await;

        let request = server.await.unwrap();
        assert_eq!(
            request,
            [0x05, 0x01, 0x00, 0x01, 0x5D, 0xB8, 0xD8, 0x22, 0x01, 0xBB]
        );
    }

    #[tokio::test]
    async fn test_connect_domain_request_bytes() {
        // Bound address comes back as a domain to exercise the length-prefixed skip
        let reply = vec![0x05, 0x00, 0x00, 0x03, 4, b'h', b'o', b's', b't', 0x00, 0x50];
        let (addr, server) = mock_proxy(move |s| capture_request(s, 18, reply)).await;

        let mut stream = client(addr).connect("example.com:80").await.unwrap();
        assert_echo(&mut stream).await;

        let request = server.await.unwrap();
        assert_eq!(
            request,
            [
                0x05, 0x01, 0x00, 0x03, 0x0B, 0x65, 0x78, 0x61, 0x6D, 0x70, 0x6C, 0x65, 0x2E,
                0x63, 0x6F, 0x6D, 0x00, 0x50
            ]
        );
    }

    #[tokio::test]
    async fn test_method_mismatch_fails_before_connect() {
        let (addr, server) = mock_proxy(|mut s| async move {
            let mut greeting = [0u8; 3];
            s.read_exact(&mut greeting).await.unwrap();
            s.write_all(&[0x05, 0x01]).await.unwrap();
            let mut rest = Vec::new();
            s.read_to_end(&mut rest).await.unwrap();
            rest
        })
        .await;

        let err = client(addr).connect("example.com:80").await.unwrap_err();
        assert!(matches!(
            err,
            SocksError::Negotiation {
                version: 0x05,
                method: 0x01
            }
        ));

        // Connection closed with nothing sent after the greeting
        let rest = server.await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_connect_refused_reports_code() {
        let (addr, server) = mock_proxy(|mut s| async move {
            let mut greeting = [0u8; 3];
            s.read_exact(&mut greeting).await.unwrap();
            s.write_all(&[0x05, 0x00]).await.unwrap();
            let mut request = [0u8; 10];
            s.read_exact(&mut request).await.unwrap();
            s.write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                .await
                .unwrap();
            // The client leaves the bound address unread, so its close may
            // arrive as a reset instead of EOF.
            let mut rest = Vec::new();
            match s.read_to_end(&mut rest).await {
                Ok(_) => {}
                Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
            }
        })
        .await;

        let err = client(addr).connect("10.1.2.3:22").await.unwrap_err();
        assert_eq!(err.reply_code(), Some(0x05));
        assert!(matches!(err, SocksError::ConnectFailed { code: 0x05 }));

        // Only returns once the client dropped its side
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_bound_address_type() {
        let (addr, _server) = mock_proxy(|mut s| async move {
            let mut greeting = [0u8; 3];
            s.read_exact(&mut greeting).await.unwrap();
            s.write_all(&[0x05, 0x00]).await.unwrap();
            let mut request = [0u8; 10];
            s.read_exact(&mut request).await.unwrap();
            s.write_all(&[0x05, 0x00, 0x00, 0x09]).await.unwrap();
            let mut rest = Vec::new();
            let _ = s.read_to_end(&mut rest).await;
        })
        .await;

        let err = client(addr).connect("10.1.2.3:22").await.unwrap_err();
        assert!(matches!(err, SocksError::UnknownAddressType(0x09)));
    }

    #[tokio::test]
    async fn test_handshake_deadline() {
        let (addr, server) = mock_proxy(|s| async move {
            // Accept, then say nothing
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(s);
        })
        .await;

        let client = Socks5Client::new(addr.to_string(), Duration::from_millis(200));
        let err = client.connect("example.com:80").await.unwrap_err();
        assert!(matches!(err, SocksError::HandshakeTimeout(_)));
        server.abort();
    }

    #[tokio::test]
    async fn test_dial_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(addr).connect("example.com:80").await.unwrap_err();
        assert!(matches!(err, SocksError::Dial { .. }));
    }

    #[tokio::test]
    async fn test_invalid_target_rejected() {
        let err = Socks5Client::new("127.0.0.1:1", Duration::from_secs(1))
            .connect("example.com:0")
            .await
            .unwrap_err();
        assert!(matches!(err, SocksError::InvalidPort(_)));
    }
}
