//! Probe and speed measurements through the supervised core
//!
//! Requests travel over whatever [`Transport`](crate::transport::Transport)
//! the [`HttpClient`] was built with; in practice a SOCKS5 tunnel into the
//! core's inbound.

mod client;
mod probe;
mod speed;

pub use client::{HttpClient, HttpResponse, MAX_REDIRECTS};
pub use probe::{probe, ProbeReport, PROBE_BODY_LIMIT};
pub use speed::{speed, SpeedReport, DEFAULT_MAX_BYTES};

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Run `fut` under `timeout`; zero means no deadline.
async fn with_deadline<T>(timeout: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    if timeout.is_zero() {
        return fut.await;
    }
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::Timeout)?
}
