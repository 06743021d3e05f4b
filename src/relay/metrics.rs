//! Prometheus mirrors of relay activity
//!
//! These follow [`TrafficCounters`](super::TrafficCounters) but never feed
//! back into it; the reporter reads the counters only.

use std::time::Instant;

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref RELAY_CONNECTIONS_TOTAL: IntCounter = IntCounter::new(
        "health_node_relay_connections_total",
        "Total number of connections accepted by the relay"
    ).unwrap();

    pub static ref RELAY_CONNECTIONS_ACTIVE: IntGauge = IntGauge::new(
        "health_node_relay_connections_active",
        "Number of currently relayed connections"
    ).unwrap();

    pub static ref RELAY_DIAL_FAILURES: IntCounter = IntCounter::new(
        "health_node_relay_dial_failures_total",
        "Accepted connections closed because the core endpoint could not be dialed"
    ).unwrap();

    pub static ref RELAY_BYTES_UPLOADED: IntCounter = IntCounter::new(
        "health_node_relay_bytes_uploaded_total",
        "Bytes relayed from clients to the core"
    ).unwrap();

    pub static ref RELAY_BYTES_DOWNLOADED: IntCounter = IntCounter::new(
        "health_node_relay_bytes_downloaded_total",
        "Bytes relayed from the core to clients"
    ).unwrap();

    pub static ref RELAY_CONNECTION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "health_node_relay_connection_duration_seconds",
            "Relayed connection duration in seconds"
        ).buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0])
    ).unwrap();
}

/// Register all metrics with the global registry. Repeated calls are no-ops.
pub fn init_metrics() {
    REGISTRY.register(Box::new(RELAY_CONNECTIONS_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(RELAY_CONNECTIONS_ACTIVE.clone())).ok();
    REGISTRY.register(Box::new(RELAY_DIAL_FAILURES.clone())).ok();
    REGISTRY.register(Box::new(RELAY_BYTES_UPLOADED.clone())).ok();
    REGISTRY.register(Box::new(RELAY_BYTES_DOWNLOADED.clone())).ok();
    REGISTRY.register(Box::new(RELAY_CONNECTION_DURATION.clone())).ok();
}

/// Tracks one relayed connection from accept to close
pub struct ConnectionMetrics {
    start_time: Instant,
}

impl ConnectionMetrics {
    pub fn accepted() -> Self {
        RELAY_CONNECTIONS_TOTAL.inc();
        RELAY_CONNECTIONS_ACTIVE.inc();
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn dial_failed(&self) {
        RELAY_DIAL_FAILURES.inc();
    }
}

impl Drop for ConnectionMetrics {
    fn drop(&mut self) {
        RELAY_CONNECTIONS_ACTIVE.dec();
        RELAY_CONNECTION_DURATION.observe(self.start_time.elapsed().as_secs_f64());
    }
}
