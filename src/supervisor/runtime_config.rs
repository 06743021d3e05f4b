//! Configuration document written for the external core

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::descriptor::OutboundDescriptor;
use crate::error::{Error, Result};

/// Address every core inbound listens on
pub const LISTEN_ADDR: &str = "127.0.0.1";

/// Tag of the pass-through fallback outbound
pub const DIRECT_TAG: &str = "direct";

/// Core log level used when none is given
pub const DEFAULT_LOG_LEVEL: &str = "warning";

/// Local inbound protocol served by the core
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundProtocol {
    #[default]
    Socks,
    Http,
}

impl InboundProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundProtocol::Socks => "socks",
            InboundProtocol::Http => "http",
        }
    }

    /// Conventional local port for this inbound
    pub fn default_port(&self) -> u16 {
        match self {
            InboundProtocol::Socks => 1080,
            InboundProtocol::Http => 8080,
        }
    }
}

impl fmt::Display for InboundProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InboundProtocol {
    type Err = Error;

    /// Blank input selects the default (`socks`).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "socks" => Ok(InboundProtocol::Socks),
            "http" => Ok(InboundProtocol::Http),
            other => Err(Error::Config(format!(
                "unsupported inbound protocol {:?} (use socks or http)",
                other
            ))),
        }
    }
}

/// Full document the core is started with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub log: CoreLogConfig,
    pub inbounds: Vec<CoreInbound>,
    pub outbounds: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreLogConfig {
    pub loglevel: String,
    pub access: PathBuf,
    pub error: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreInbound {
    pub listen: String,
    pub port: u16,
    pub protocol: InboundProtocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
}

impl CoreConfig {
    /// One local inbound, the caller's outbound first, then `direct`.
    pub fn build(
        port: u16,
        inbound: InboundProtocol,
        log_level: &str,
        outbound: &OutboundDescriptor,
        log_dir: &Path,
    ) -> Result<Self> {
        let settings = match inbound {
            InboundProtocol::Socks => Some(serde_json::json!({ "udp": false })),
            InboundProtocol::Http => None,
        };

        let loglevel = match log_level.trim() {
            "" => DEFAULT_LOG_LEVEL.to_string(),
            level => level.to_string(),
        };

        let primary = serde_json::to_value(outbound)
            .map_err(|e| Error::Config(format!("Failed to encode outbound: {}", e)))?;

        Ok(CoreConfig {
            log: CoreLogConfig {
                loglevel,
                access: log_dir.join(super::ACCESS_LOG_FILE),
                error: log_dir.join(super::CORE_LOG_FILE),
            },
            inbounds: vec![CoreInbound {
                listen: LISTEN_ADDR.to_string(),
                port,
                protocol: inbound,
                settings,
            }],
            outbounds: vec![
                primary,
                serde_json::json!({ "tag": DIRECT_TAG, "protocol": "freedom" }),
            ],
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to encode core config: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse core config: {}", e)))
    }
}
