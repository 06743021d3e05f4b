//! Readiness polling for the core's local endpoint

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Per-attempt connect timeout
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause between attempts
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Polls an endpoint with bare TCP connects until one succeeds.
///
/// Dropping the future returned by [`ReadinessPoller::wait`] cancels it.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPoller {
    attempt_timeout: Duration,
    interval: Duration,
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new(ATTEMPT_TIMEOUT, POLL_INTERVAL)
    }
}

impl ReadinessPoller {
    pub fn new(attempt_timeout: Duration, interval: Duration) -> Self {
        Self {
            attempt_timeout,
            interval,
        }
    }

    /// Block until `addr` accepts a connection, or fail once `deadline` has
    /// elapsed. The probe connection is closed straight away.
    pub async fn wait(&self, addr: &str, deadline: Duration) -> Result<()> {
        let started = Instant::now();
        let expires = started + deadline;
        let mut attempts = 0u32;

        loop {
            let remaining = expires.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            attempts += 1;
            let attempt = self.attempt_timeout.min(remaining);
            match tokio::time::timeout(attempt, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    drop(stream);
                    debug!(
                        "{} ready after {} attempt(s), {:?}",
                        addr,
                        attempts,
                        started.elapsed()
                    );
                    return Ok(());
                }
                Ok(Err(e)) => trace!("{} not ready: {}", addr, e),
                Err(_) => trace!("{} not ready: connect timed out", addr),
            }

            let remaining = expires.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.interval.min(remaining)).await;
        }

        Err(Error::ReadinessTimeout {
            addr: addr.to_string(),
            waited: started.elapsed(),
        })
    }
}
