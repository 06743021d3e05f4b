//! Launching and stopping the external core

use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::descriptor::OutboundDescriptor;
use super::readiness::ReadinessPoller;
use super::runtime_config::{CoreConfig, InboundProtocol, DEFAULT_LOG_LEVEL, LISTEN_ADDR};
use super::{ACCESS_LOG_FILE, CONFIG_FILE, CORE_LOG_FILE, WORK_DIR_PREFIX};
use crate::error::{Error, Result};

/// Launch parameters for one core instance
#[derive(Debug, Clone)]
pub struct CoreRunner {
    core_path: PathBuf,
    port: u16,
    inbound: InboundProtocol,
    log_level: String,
}

impl CoreRunner {
    pub fn new(core_path: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            core_path: core_path.into(),
            port,
            inbound: InboundProtocol::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    pub fn inbound(mut self, inbound: InboundProtocol) -> Self {
        self.inbound = inbound;
        self
    }

    /// Blank selects the default level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Write the core config into a fresh private directory and spawn the
    /// core. Must be called from within a Tokio runtime.
    pub fn start(&self, outbound: &OutboundDescriptor) -> Result<CoreProcess> {
        if self.core_path.as_os_str().is_empty() {
            return Err(Error::Config("core path is required".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("core port must be in 1..65535".into()));
        }

        let work_dir = tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir()?;
        let config_path = work_dir.path().join(CONFIG_FILE);
        let log_path = work_dir.path().join(CORE_LOG_FILE);
        let access_log_path = work_dir.path().join(ACCESS_LOG_FILE);

        let config = CoreConfig::build(
            self.port,
            self.inbound,
            &self.log_level,
            outbound,
            work_dir.path(),
        )?;
        write_private(&config_path, config.to_json()?.as_bytes())?;

        let log = File::create(&log_path)?;
        let stdout = log.try_clone()?;

        let child = Command::new(&self.core_path)
            .args(core_args(&self.core_path, &config_path))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(log))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Launch {
                path: self.core_path.display().to_string(),
                source,
            })?;

        info!(
            "Started core {} (pid {}) with {} inbound on {}:{}",
            self.core_path.display(),
            child.id().unwrap_or_default(),
            self.inbound,
            LISTEN_ADDR,
            self.port
        );

        Ok(CoreProcess {
            child: Some(child),
            endpoint: format!("{}:{}", LISTEN_ADDR, self.port),
            port: self.port,
            config_path,
            log_path,
            access_log_path,
            _work_dir: work_dir,
        })
    }
}

/// Invocation style depends on the binary name: xray takes `run -c`,
/// v2ray-compatible cores take `-config`.
pub fn core_args(core_path: &Path, config_path: &Path) -> Vec<OsString> {
    let is_xray = core_path
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase().contains("xray"))
        .unwrap_or(false);

    let mut args: Vec<OsString> = if is_xray {
        vec!["run".into(), "-c".into()]
    } else {
        vec!["-config".into()]
    };
    args.push(config_path.as_os_str().to_os_string());
    args
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents)?;
    Ok(())
}

/// A running core together with its scratch directory.
///
/// Dropping the handle kills the child and removes the directory; call
/// [`CoreProcess::stop`] to also wait for the exit.
#[derive(Debug)]
pub struct CoreProcess {
    child: Option<Child>,
    endpoint: String,
    port: u16,
    config_path: PathBuf,
    log_path: PathBuf,
    access_log_path: PathBuf,
    _work_dir: TempDir,
}

impl CoreProcess {
    /// `127.0.0.1:<port>` of the core's inbound
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Combined stdout/stderr and error log of the core
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn access_log_path(&self) -> &Path {
        &self.access_log_path
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Wait until the inbound accepts connections. Fails early with
    /// [`Error::CoreExited`] if the core dies first.
    pub async fn wait_ready(&mut self, poller: &ReadinessPoller, deadline: Duration) -> Result<()> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| Error::Config("core is not running".into()))?;

        tokio::select! {
            ready = poller.wait(&self.endpoint, deadline) => ready,
            status = child.wait() => match status {
                Ok(status) => Err(Error::CoreExited { status }),
                Err(e) => Err(Error::Io(e)),
            },
        }
    }

    /// Kill the core and wait for it to exit. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Err(e) = child.start_kill() {
            debug!("Core already exited: {}", e);
        }
        match child.wait().await {
            Ok(status) => debug!("Core stopped ({})", status),
            Err(e) => warn!("Failed to reap core: {}", e),
        }
    }

    /// Last `max_bytes` of the core log, lossily decoded. Empty when the
    /// log cannot be read.
    pub fn read_log_tail(&self, max_bytes: u64) -> String {
        read_tail(&self.log_path, max_bytes).unwrap_or_default()
    }
}

impl Drop for CoreProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            warn!("Core handle dropped while running, killing it");
            let _ = child.start_kill();
        }
    }
}

fn read_tail(path: &Path, max_bytes: u64) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len > max_bytes {
        file.seek(SeekFrom::Start(len - max_bytes))?;
    }

    let mut buf = Vec::with_capacity(len.min(max_bytes) as usize);
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
