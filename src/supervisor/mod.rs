//! Supervision of the external V2Ray/Xray core
//!
//! The core runs out of a private scratch directory holding its generated
//! config and log files. [`CoreRunner::start`] spawns it, the
//! [`ReadinessPoller`] waits for its inbound, and [`CoreProcess::stop`]
//! kills it again.

mod access_log;
mod descriptor;
mod locate;
mod process;
mod readiness;
mod runtime_config;

pub use access_log::{AccessLogFollower, FOLLOW_INTERVAL};
pub use descriptor::OutboundDescriptor;
pub use locate::{random_port, random_port_except, resolve_core_path};
pub use process::{core_args, CoreProcess, CoreRunner};
pub use readiness::{ReadinessPoller, ATTEMPT_TIMEOUT, POLL_INTERVAL};
pub use runtime_config::{
    CoreConfig, CoreInbound, CoreLogConfig, InboundProtocol, DEFAULT_LOG_LEVEL, DIRECT_TAG,
    LISTEN_ADDR,
};

/// Prefix of the per-run scratch directory
pub const WORK_DIR_PREFIX: &str = "proxy-node-";

pub const CONFIG_FILE: &str = "config.json";
pub const CORE_LOG_FILE: &str = "core.log";
pub const ACCESS_LOG_FILE: &str = "access.log";

/// Bytes of core log attached to failure reports
pub const LOG_TAIL_BYTES: u64 = 4000;
