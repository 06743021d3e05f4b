//! Error types for health-node

use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Main error type for health-node
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start core {path}: {source}")]
    Launch {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Core exited before becoming ready ({status})")]
    CoreExited { status: ExitStatus },

    #[error("Endpoint {addr} not ready after {waited:?}")]
    ReadinessTimeout { addr: String, waited: Duration },

    #[error("SOCKS5 error: {0}")]
    Socks(#[from] SocksError),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    #[error("Timeout")]
    Timeout,

    /// A failure while driving the core, carrying its captured log tail.
    #[error("{stage}: {source}\ncore log tail:\n{log_tail}")]
    Core {
        stage: &'static str,
        #[source]
        source: Box<Error>,
        log_tail: String,
    },
}

impl Error {
    /// Wrap with what was being attempted and the core's log tail.
    pub fn with_log_tail(self, stage: &'static str, log_tail: String) -> Self {
        Error::Core {
            stage,
            source: Box::new(self),
            log_tail,
        }
    }
}

/// Failures of the SOCKS5 client handshake, one per stage.
#[derive(Error, Debug)]
pub enum SocksError {
    #[error("dial socks server {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dial socks server {addr}: timed out")]
    DialTimeout { addr: String },

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("greeting write: {0}")]
    GreetingWrite(#[source] std::io::Error),

    #[error("greeting read: {0}")]
    GreetingRead(#[source] std::io::Error),

    #[error("auth negotiation failed (reply {version:#04x} {method:#04x})")]
    Negotiation { version: u8, method: u8 },

    #[error("target address {0:?} is invalid")]
    InvalidTarget(String),

    #[error("target port in {0:?} is invalid")]
    InvalidPort(String),

    #[error("connect write: {0}")]
    ConnectWrite(#[source] std::io::Error),

    #[error("connect read: {0}")]
    ConnectRead(#[source] std::io::Error),

    #[error("invalid socks version {0:#04x} in reply")]
    ReplyVersion(u8),

    #[error("connect failed, code={code:#x} ({})", reply_message(*.code))]
    ConnectFailed { code: u8 },

    #[error("reply had unknown address type {0:#04x}")]
    UnknownAddressType(u8),

    #[error("reply tail read: {0}")]
    ReplyTailRead(#[source] std::io::Error),
}

impl SocksError {
    /// Raw reply code when the proxy refused the CONNECT.
    pub fn reply_code(&self) -> Option<u8> {
        match self {
            SocksError::ConnectFailed { code } => Some(*code),
            _ => None,
        }
    }
}

/// Human-readable meaning of a SOCKS5 reply code.
pub fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}

/// Result type alias for health-node
pub type Result<T> = std::result::Result<T, Error>;
