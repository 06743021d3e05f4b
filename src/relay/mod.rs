//! Metered TCP relay in front of the core
//!
//! Forwards raw bytes between local clients and the core's inbound while
//! adding every relayed chunk to shared [`TrafficCounters`].

mod counters;
pub mod metrics;
mod reporter;
mod session;

pub use counters::{TrafficCounters, TrafficSnapshot};
pub use reporter::{format_report, TrafficReporter, REPORT_INTERVAL};
pub use session::RelaySession;
