//! health-node - V2Ray/Xray outbound health checker

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use health_node::app::{
    run_probe, run_proxy, run_speed, CoreSettings, ProbeOptions, ProxyOptions, SpeedOptions,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_PROBE_URL, DEFAULT_SPEED_TIMEOUT, DEFAULT_SPEED_URL,
};
use health_node::error::{Error, Result};
use health_node::harness::DEFAULT_MAX_BYTES;
use health_node::supervisor::{resolve_core_path, InboundProtocol, OutboundDescriptor};
use health_node::NodeConfig;

#[derive(Parser, Debug)]
#[command(name = "health-node")]
#[command(author, version, about = "V2Ray/Xray outbound health checker", long_about = None)]
struct Cli {
    /// JSON config file with defaults for any flag
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the core and run an HTTP probe through its SOCKS5 inbound
    Probe {
        #[command(flatten)]
        common: CommonArgs,

        /// Probe URL
        #[arg(long)]
        url: Option<String>,

        /// Core SOCKS port (default: random 20000-40000)
        #[arg(long, value_name = "PORT")]
        local_socks: Option<u16>,
    },

    /// Start the core and measure download speed through it
    Speed {
        #[command(flatten)]
        common: CommonArgs,

        /// Download URL
        #[arg(long)]
        url: Option<String>,

        #[arg(long, value_name = "PORT")]
        local_socks: Option<u16>,

        /// Stop after N bytes (0 reads the full response)
        #[arg(long, value_name = "N")]
        max_bytes: Option<u64>,
    },

    /// Start the core and keep a local proxy open until interrupted
    #[command(alias = "socks")]
    Proxy {
        #[command(flatten)]
        common: CommonArgs,

        /// Inbound protocol: socks or http
        #[arg(long)]
        inbound: Option<String>,

        /// Local listen port (default: 1080 for socks, 8080 for http)
        #[arg(long, value_name = "PORT")]
        local_port: Option<u16>,

        /// Stream the core's access log while running
        #[arg(long)]
        print_requests: bool,

        /// Disable the uplink/downlink traffic meter
        #[arg(long)]
        no_traffic: bool,

        /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
        #[arg(long, value_name = "ADDR")]
        api: Option<String>,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Outbound descriptor JSON file
    #[arg(long, value_name = "FILE", required_unless_present = "outbound_json")]
    outbound: Option<PathBuf>,

    /// Outbound descriptor as inline JSON
    #[arg(long, value_name = "JSON", conflicts_with = "outbound")]
    outbound_json: Option<String>,

    /// Core binary path (auto-detected if omitted)
    #[arg(long, value_name = "PATH")]
    core: Option<String>,

    /// Timeout for startup and checks, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Core log level
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for result lines
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let name = command_name(&cli.command);
    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} failed: {}", name, e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };

    match cli.command {
        Command::Probe {
            common,
            url,
            local_socks,
        } => {
            let opts = ProbeOptions {
                core: core_settings(&common, &file, DEFAULT_PROBE_TIMEOUT)?,
                socks_port: local_socks,
                url: url
                    .or_else(|| file.probe_url.clone())
                    .unwrap_or_else(|| DEFAULT_PROBE_URL.to_string()),
            };
            let report = run_probe(&opts).await?;
            println!("{}", report.summary());
        }

        Command::Speed {
            common,
            url,
            local_socks,
            max_bytes,
        } => {
            let opts = SpeedOptions {
                core: core_settings(&common, &file, DEFAULT_SPEED_TIMEOUT)?,
                socks_port: local_socks,
                url: url
                    .or_else(|| file.speed_url.clone())
                    .unwrap_or_else(|| DEFAULT_SPEED_URL.to_string()),
                max_bytes: max_bytes.or(file.max_bytes).unwrap_or(DEFAULT_MAX_BYTES),
            };
            let report = run_speed(&opts).await?;
            println!("{}", report.summary());
        }

        Command::Proxy {
            common,
            inbound,
            local_port,
            print_requests,
            no_traffic,
            api,
        } => {
            let inbound = match inbound {
                Some(name) => name.parse::<InboundProtocol>()?,
                None => file.inbound.unwrap_or_default(),
            };
            let local_port = local_port
                .or(file.local_port)
                .unwrap_or_else(|| inbound.default_port());
            let api = match api.or_else(|| file.api.clone()) {
                Some(addr) => Some(
                    addr.parse::<SocketAddr>()
                        .map_err(|e| Error::Config(format!("invalid --api address {}: {}", addr, e)))?,
                ),
                None => None,
            };

            let opts = ProxyOptions {
                core: core_settings(&common, &file, DEFAULT_PROBE_TIMEOUT)?,
                inbound,
                local_port,
                traffic: !no_traffic,
                print_requests,
                api,
            };
            run_proxy(&opts, shutdown_signal()).await?;
            info!("Goodbye!");
        }
    }

    Ok(())
}

fn core_settings(
    common: &CommonArgs,
    file: &NodeConfig,
    default_timeout: Duration,
) -> Result<CoreSettings> {
    let core_path = resolve_core_path(common.core.as_deref().or(file.core.as_deref()))?;

    let outbound = match (&common.outbound, &common.outbound_json) {
        (_, Some(json)) => OutboundDescriptor::from_json(json)?,
        (Some(path), None) => OutboundDescriptor::load(path)?,
        (None, None) => {
            return Err(Error::Config(
                "--outbound or --outbound-json is required".into(),
            ))
        }
    };

    let mut settings = CoreSettings::new(core_path, outbound);
    if let Some(level) = common.log_level.clone().or_else(|| file.log_level.clone()) {
        settings.log_level = level;
    }
    settings.timeout = common
        .timeout
        .or(file.timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(default_timeout);
    Ok(settings)
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Probe { .. } => "probe",
        Command::Speed { .. } => "speed",
        Command::Proxy { .. } => "proxy",
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
