//! Probe, speed and proxy runs around one supervised core
//!
//! Each run owns its core from start to stop; every exit path stops it, and
//! failures after launch carry the core's log tail.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::stats_api::{bind_api, serve_api};
use crate::common::Address;
use crate::error::{Error, Result};
use crate::harness::{probe, speed, HttpClient, ProbeReport, SpeedReport};
use crate::relay::{RelaySession, TrafficCounters, TrafficReporter};
use crate::supervisor::{
    random_port, random_port_except, AccessLogFollower, CoreProcess, CoreRunner, InboundProtocol,
    OutboundDescriptor, ReadinessPoller, DEFAULT_LOG_LEVEL, LISTEN_ADDR, LOG_TAIL_BYTES,
};
use crate::transport::Socks5Transport;

pub const DEFAULT_PROBE_URL: &str = "https://www.gstatic.com/generate_204";
pub const DEFAULT_SPEED_URL: &str = "https://speed.hetzner.de/10MB.bin";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_SPEED_TIMEOUT: Duration = Duration::from_secs(45);

/// Core log level while request lines are streamed
const REQUEST_LOG_LEVEL: &str = "info";

/// What every run needs to launch the core
#[derive(Debug, Clone)]
pub struct CoreSettings {
    pub core_path: PathBuf,
    pub outbound: OutboundDescriptor,
    pub log_level: String,
    /// Bounds startup and, for probe/speed, the request
    pub timeout: Duration,
}

impl CoreSettings {
    pub fn new(core_path: impl Into<PathBuf>, outbound: OutboundDescriptor) -> Self {
        Self {
            core_path: core_path.into(),
            outbound,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub core: CoreSettings,
    /// Core SOCKS port; random when unset
    pub socks_port: Option<u16>,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct SpeedOptions {
    pub core: CoreSettings,
    pub socks_port: Option<u16>,
    pub url: String,
    /// 0 reads the whole body
    pub max_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub core: CoreSettings,
    pub inbound: InboundProtocol,
    pub local_port: u16,
    /// Front the core with a metered relay and report traffic
    pub traffic: bool,
    /// Stream the core's access log
    pub print_requests: bool,
    pub api: Option<SocketAddr>,
}

/// Start a core and probe `url` through it.
pub async fn run_probe(opts: &ProbeOptions) -> Result<ProbeReport> {
    let port = opts.socks_port.unwrap_or_else(random_port);
    let mut core = start_ready(&opts.core, port, InboundProtocol::Socks, &opts.core.log_level).await?;

    let client = socks_client(&core, opts.core.timeout);
    let result = probe(&client, &opts.url, opts.core.timeout).await;
    finish(&mut core, "probe request failed", result).await
}

/// Start a core and measure download throughput through it.
pub async fn run_speed(opts: &SpeedOptions) -> Result<SpeedReport> {
    let port = opts.socks_port.unwrap_or_else(random_port);
    let mut core = start_ready(&opts.core, port, InboundProtocol::Socks, &opts.core.log_level).await?;

    let client = socks_client(&core, opts.core.timeout);
    let result = speed(&client, &opts.url, opts.max_bytes, opts.core.timeout).await;
    finish(&mut core, "speed request failed", result).await
}

/// Keep a local proxy running until `shutdown` resolves.
pub async fn run_proxy<F>(opts: &ProxyOptions, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    if opts.local_port == 0 {
        return Err(Error::Config("--local-port must be in range 1..65535".into()));
    }

    let core_port = if opts.traffic {
        random_port_except(opts.local_port)
    } else {
        opts.local_port
    };
    let log_level = if opts.print_requests {
        REQUEST_LOG_LEVEL
    } else {
        opts.core.log_level.as_str()
    };

    let mut core = start_ready(&opts.core, core_port, opts.inbound, log_level).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = ProxyTasks::default();

    if let Err(e) = tasks.start(opts, &core, &shutdown_rx).await {
        let tail = core.read_log_tail(LOG_TAIL_BYTES);
        tasks.shutdown(&shutdown_tx).await;
        core.stop().await;
        return Err(e.with_log_tail("proxy setup failed", tail));
    }

    let listen = format!("{}:{}", LISTEN_ADDR, opts.local_port);
    println!(
        "status=ok mode=proxy inbound={} protocol={} listen={}",
        opts.inbound,
        opts.core.outbound.protocol().unwrap_or("unknown"),
        listen
    );
    info!("Running until interrupted (Ctrl+C)");
    if opts.print_requests {
        info!("Core log: {}", core.log_path().display());
    }

    shutdown.await;
    info!("Shutting down");

    tasks.shutdown(&shutdown_tx).await;
    core.stop().await;
    Ok(())
}

/// Launch the core and wait for its inbound; the core is stopped again if
/// it never becomes ready.
async fn start_ready(
    settings: &CoreSettings,
    port: u16,
    inbound: InboundProtocol,
    log_level: &str,
) -> Result<CoreProcess> {
    let mut core = CoreRunner::new(&settings.core_path, port)
        .inbound(inbound)
        .log_level(log_level)
        .start(&settings.outbound)?;

    if let Err(e) = core
        .wait_ready(&ReadinessPoller::default(), settings.timeout)
        .await
    {
        let tail = core.read_log_tail(LOG_TAIL_BYTES);
        core.stop().await;
        return Err(e.with_log_tail("core did not become ready", tail));
    }

    info!("Core ready on {}", core.endpoint());
    Ok(core)
}

fn socks_client(core: &CoreProcess, timeout: Duration) -> HttpClient {
    HttpClient::new(Arc::new(Socks5Transport::new(core.endpoint(), timeout)))
}

async fn finish<T>(core: &mut CoreProcess, stage: &'static str, result: Result<T>) -> Result<T> {
    let result = result.map_err(|e| e.with_log_tail(stage, core.read_log_tail(LOG_TAIL_BYTES)));
    core.stop().await;
    result
}

/// Background parts of proxy mode, torn down in declaration order
#[derive(Default)]
struct ProxyTasks {
    follower: Option<JoinHandle<()>>,
    reporter: Option<JoinHandle<()>>,
    relay: Option<RelaySession>,
    api: Option<JoinHandle<()>>,
}

impl ProxyTasks {
    async fn start(
        &mut self,
        opts: &ProxyOptions,
        core: &CoreProcess,
        shutdown_rx: &watch::Receiver<bool>,
    ) -> Result<()> {
        if opts.print_requests {
            let follower = AccessLogFollower::new(core.access_log_path());
            self.follower = Some(follower.spawn(shutdown_rx.clone()));
        }

        if opts.traffic {
            let counters = Arc::new(TrafficCounters::new());
            let target = Address::from(SocketAddr::from((Ipv4Addr::LOCALHOST, core.port())));
            let listen = format!("{}:{}", LISTEN_ADDR, opts.local_port);
            self.relay = Some(RelaySession::start(&listen, target, counters.clone()).await?);
            self.reporter = Some(TrafficReporter::new(counters).spawn(shutdown_rx.clone()));
            info!("Traffic meter enabled (uplink/downlink)");
        }

        if let Some(addr) = opts.api {
            let listener = bind_api(addr).await?;
            self.api = Some(tokio::spawn(serve_api(listener, shutdown_rx.clone())));
        }

        Ok(())
    }

    async fn shutdown(&mut self, shutdown_tx: &watch::Sender<bool>) {
        let _ = shutdown_tx.send(true);

        for task in [self.follower.take(), self.reporter.take()].into_iter().flatten() {
            if let Err(e) = task.await {
                warn!("Background task failed: {}", e);
            }
        }
        if let Some(mut relay) = self.relay.take() {
            relay.stop().await;
        }
        if let Some(api) = self.api.take() {
            if let Err(e) = api.await {
                warn!("Metrics server task failed: {}", e);
            }
        }
    }
}
