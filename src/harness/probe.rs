//! Connectivity probe: one GET, small body read, latency

use std::time::{Duration, Instant};

use super::client::HttpClient;
use super::with_deadline;
use crate::error::Result;

/// Body bytes read and discarded by a probe
pub const PROBE_BODY_LIMIT: u64 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub status: u16,
    pub latency: Duration,
    pub bytes: u64,
}

impl ProbeReport {
    /// `status=ok code=<n> latency_ms=<n> bytes=<n>`
    pub fn summary(&self) -> String {
        format!(
            "status=ok code={} latency_ms={} bytes={}",
            self.status,
            self.latency.as_millis(),
            self.bytes
        )
    }
}

/// GET `url` and time it until at most [`PROBE_BODY_LIMIT`] body bytes
/// are in. Any status counts as a successful probe, and a body that breaks
/// off reports the bytes that did arrive.
pub async fn probe(client: &HttpClient, url: &str, timeout: Duration) -> Result<ProbeReport> {
    with_deadline(timeout, async {
        let started = Instant::now();
        let mut response = client.get(url).await?;
        let bytes = response.read_body_lossy(PROBE_BODY_LIMIT).await;

        Ok(ProbeReport {
            status: response.status().as_u16(),
            latency: started.elapsed(),
            bytes,
        })
    })
    .await
}
