//! Configuration file for health-node
//!
//! Every field is optional; command-line flags override file values and
//! file values override built-in defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::supervisor::InboundProtocol;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Path to the xray/v2ray binary
    pub core: Option<String>,

    /// Log level passed to the core
    pub log_level: Option<String>,

    /// Startup and request timeout in seconds
    pub timeout_secs: Option<u64>,

    pub probe_url: Option<String>,

    pub speed_url: Option<String>,

    /// Download budget for `speed`; 0 reads the whole body
    pub max_bytes: Option<u64>,

    /// Inbound protocol for `proxy`
    pub inbound: Option<InboundProtocol>,

    /// Public listen port for `proxy`
    pub local_port: Option<u16>,

    /// Metrics API listen address for `proxy` (e.g. "127.0.0.1:9090")
    pub api: Option<String>,
}

impl NodeConfig {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config() {
        let config = NodeConfig::from_json(
            r#"{"core": "/opt/xray/xray", "timeout_secs": 30, "inbound": "http"}"#,
        )
        .unwrap();
        assert_eq!(config.core.as_deref(), Some("/opt/xray/xray"));
        assert_eq!(config.timeout_secs, Some(30));
        assert_eq!(config.inbound, Some(InboundProtocol::Http));
        assert_eq!(config.probe_url, None);
    }

    #[test]
    fn test_empty_and_invalid() {
        assert_eq!(NodeConfig::from_json("{}").unwrap(), NodeConfig::default());
        assert!(matches!(
            NodeConfig::from_json(r#"{"inbound": "vmess"}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            NodeConfig::from_json(r#"{"local_port": 70000}"#),
            Err(Error::Config(_))
        ));
    }
}
