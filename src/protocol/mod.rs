//! Proxy protocol layer
//!
//! Client side of the handshakes used to reach the core's local inbound.

pub mod socks5;

pub use socks5::{encode_connect_request, handshake, Socks5Client};
