//! Minimal HTTP/1.1 GET client over a pluggable transport

use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::header::{ACCEPT, HOST, LOCATION, USER_AGENT};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::task::JoinHandle;
use tracing::debug;
use url::{Host, Position, Url};

use crate::common::{Address, Network};
use crate::error::{Error, Result};
use crate::transport::{TlsClient, Transport};

/// Requests in one redirect chain, the first one included. A fifth
/// redirect response fails the request.
pub const MAX_REDIRECTS: usize = 5;

const AGENT: &str = concat!("health-node/", env!("CARGO_PKG_VERSION"));

/// One request per connection; every connection is opened through the
/// transport it was built with.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    tls: TlsClient,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            tls: TlsClient::new(),
        }
    }

    /// GET `url`, following redirects while the chain stays under
    /// [`MAX_REDIRECTS`] requests.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        let mut url =
            Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;

        for hop in 0..MAX_REDIRECTS {
            let response = self.send(&url).await?;
            let Some(next) = redirect_target(&url, &response)? else {
                return Ok(response);
            };
            if hop + 1 == MAX_REDIRECTS {
                break;
            }
            debug!("Redirect {} -> {} ({})", url, next, response.status());
            url = next;
        }

        Err(Error::TooManyRedirects(MAX_REDIRECTS))
    }

    async fn send(&self, url: &Url) -> Result<HttpResponse> {
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(Error::InvalidUrl(format!("unsupported scheme {}", other))),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidUrl(format!("{} has no port", url)))?;
        let (target, server_name) = match url.host() {
            Some(Host::Domain(domain)) => (Address::domain(domain, port), domain.to_string()),
            Some(Host::Ipv4(ip)) => (Address::ip_port(IpAddr::V4(ip), port), ip.to_string()),
            Some(Host::Ipv6(ip)) => (Address::ip_port(IpAddr::V6(ip), port), ip.to_string()),
            None => return Err(Error::InvalidUrl(format!("{} has no host", url))),
        };

        let mut stream = self.transport.connect(Network::Tcp, &target).await?;
        if tls {
            stream = self.tls.wrap(stream, &server_name).await?;
        }

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        let conn_task = tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("HTTP connection ended: {}", e);
            }
        });

        let request = Request::get(&url[Position::BeforePath..Position::AfterQuery])
            .header(HOST, &url[Position::BeforeHost..Position::AfterPort])
            .header(USER_AGENT, AGENT)
            .header(ACCEPT, "*/*")
            .body(Empty::<Bytes>::new())
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;

        let response = match sender.send_request(request).await {
            Ok(response) => response,
            Err(e) => {
                conn_task.abort();
                return Err(e.into());
            }
        };

        let (parts, body) = response.into_parts();
        Ok(HttpResponse {
            status: parts.status,
            location: parts
                .headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body,
            conn_task,
        })
    }
}

fn redirect_target(current: &Url, response: &HttpResponse) -> Result<Option<Url>> {
    let redirect = matches!(
        response.status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    );
    match (&response.location, redirect) {
        (Some(location), true) => current
            .join(location)
            .map(Some)
            .map_err(|e| Error::InvalidUrl(format!("bad redirect {:?}: {}", location, e))),
        _ => Ok(None),
    }
}

/// Response headers plus a body that has not been read yet.
///
/// Dropping it tears the connection down.
pub struct HttpResponse {
    status: StatusCode,
    location: Option<String>,
    body: Incoming,
    conn_task: JoinHandle<()>,
}

impl HttpResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Read and discard the body, stopping after `limit` bytes when
    /// `limit > 0`. Ending early at a clean end of body is not an error.
    pub async fn read_body(&mut self, limit: u64) -> Result<u64> {
        let mut total: u64 = 0;
        self.read_counted(limit, &mut total).await?;
        Ok(total)
    }

    /// Like [`read_body`](Self::read_body), but a body that breaks off
    /// midway counts as a short read of what arrived.
    pub async fn read_body_lossy(&mut self, limit: u64) -> u64 {
        let mut total: u64 = 0;
        if let Err(e) = self.read_counted(limit, &mut total).await {
            debug!("Body ended after {} bytes: {}", total, e);
        }
        total
    }

    async fn read_counted(&mut self, limit: u64, total: &mut u64) -> Result<()> {
        while limit == 0 || *total < limit {
            let Some(frame) = self.body.frame().await else {
                break;
            };
            if let Ok(data) = frame?.into_data() {
                let n = data.len() as u64;
                *total += if limit == 0 { n } else { n.min(limit - *total) };
            }
        }
        Ok(())
    }
}

impl Drop for HttpResponse {
    fn drop(&mut self) {
        self.conn_task.abort();
    }
}
