//! Application layer
//!
//! - Pipeline: probe, speed and proxy runs that own a core for their duration
//! - StatsApi: Prometheus endpoint for proxy mode

mod pipeline;
pub mod stats_api;

pub use pipeline::{
    run_probe, run_proxy, run_speed, CoreSettings, ProbeOptions, ProxyOptions, SpeedOptions,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_PROBE_URL, DEFAULT_SPEED_TIMEOUT, DEFAULT_SPEED_URL,
};
