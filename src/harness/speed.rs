//! Download throughput measurement

use std::time::{Duration, Instant};

use super::client::HttpClient;
use super::with_deadline;
use crate::error::{Error, Result};

/// Default download budget (10 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedReport {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl SpeedReport {
    /// Megabits per second; zero when no time elapsed.
    pub fn mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        (self.bytes as f64 * 8.0) / secs / 1_000_000.0
    }

    /// `status=ok bytes=<n> elapsed_ms=<n> mbps=<x.xx>`
    pub fn summary(&self) -> String {
        format!(
            "status=ok bytes={} elapsed_ms={} mbps={:.2}",
            self.bytes,
            self.elapsed.as_millis(),
            self.mbps()
        )
    }
}

/// GET `url` and read up to `max_bytes` of body (the whole body when 0).
///
/// A status of 400 or above fails before the body is read. A body that
/// ends before the budget is not an error.
pub async fn speed(
    client: &HttpClient,
    url: &str,
    max_bytes: u64,
    timeout: Duration,
) -> Result<SpeedReport> {
    with_deadline(timeout, async {
        let started = Instant::now();
        let mut response = client.get(url).await?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(Error::HttpStatus(status));
        }

        let bytes = response.read_body(max_bytes).await?;
        Ok(SpeedReport {
            bytes,
            elapsed: started.elapsed(),
        })
    })
    .await
}
