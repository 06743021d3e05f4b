//! Periodic traffic report

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use super::counters::{TrafficCounters, TrafficSnapshot};
use crate::common::{format_bytes, shutdown_signalled};

pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Samples the counters on a fixed interval and logs rate plus totals.
/// Read-only with respect to the counters.
pub struct TrafficReporter {
    counters: Arc<TrafficCounters>,
    interval: Duration,
}

impl TrafficReporter {
    pub fn new(counters: Arc<TrafficCounters>) -> Self {
        Self {
            counters,
            interval: REPORT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until `shutdown` flips to true.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = self.counters.snapshot();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = self.counters.snapshot();
                        info!("{}", format_report(now.delta_since(&last), now, self.interval));
                        last = now;
                    }
                    _ = shutdown_signalled(&mut shutdown) => break,
                }
            }
        })
    }
}

/// `[traffic] up=<rate>/s down=<rate>/s total_up=<n> total_down=<n>`
pub fn format_report(delta: TrafficSnapshot, total: TrafficSnapshot, interval: Duration) -> String {
    format!(
        "[traffic] up={}/s down={}/s total_up={} total_down={}",
        format_bytes(per_second(delta.up, interval)),
        format_bytes(per_second(delta.down, interval)),
        format_bytes(total.up),
        format_bytes(total.down)
    )
}

fn per_second(bytes: u64, interval: Duration) -> u64 {
    let secs = interval.as_secs_f64();
    if secs <= 0.0 {
        return bytes;
    }
    (bytes as f64 / secs) as u64
}
