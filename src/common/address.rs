//! Address type for tunnel targets

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::SocksError;

/// Longest domain name a SOCKS5 request can carry
pub const MAX_DOMAIN_LEN: usize = 255;

/// Network address representation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// IP socket address (IP + port)
    Socket(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl Address {
    /// Create from domain and port
    pub fn domain(domain: impl Into<String>, port: u16) -> Self {
        Address::Domain(domain.into(), port)
    }

    /// Create from IP and port.
    ///
    /// IPv4-mapped IPv6 addresses are folded back to IPv4.
    pub fn ip_port(ip: IpAddr, port: u16) -> Self {
        let ip = match ip {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            },
            v4 => v4,
        };
        Address::Socket(SocketAddr::new(ip, port))
    }

    /// Get the port
    pub fn port(&self) -> u16 {
        match self {
            Address::Socket(addr) => addr.port(),
            Address::Domain(_, port) => *port,
        }
    }

    /// Parse a `host:port` target.
    ///
    /// IPv6 literals must be bracketed (`[::1]:443`). The port must be in
    /// 1..=65535; a domain must be 1..=255 bytes after trimming.
    pub fn parse(target: &str) -> std::result::Result<Self, SocksError> {
        let (host, port) = split_host_port(target)
            .ok_or_else(|| SocksError::InvalidTarget(target.to_string()))?;

        let port = match port.parse::<u16>() {
            Ok(p) if p != 0 => p,
            _ => return Err(SocksError::InvalidPort(target.to_string())),
        };

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Address::ip_port(ip, port));
        }

        let host = host.trim();
        if host.is_empty() || host.len() > MAX_DOMAIN_LEN {
            return Err(SocksError::InvalidTarget(target.to_string()));
        }
        Ok(Address::Domain(host.to_string(), port))
    }
}

/// Split `host:port`, `[v6]:port`. A bare IPv6 without brackets is rejected.
fn split_host_port(s: &str) -> Option<(&str, &str)> {
    if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        return Some((host, port));
    }

    let (host, port) = s.rsplit_once(':')?;
    if host.contains(':') || host.contains('[') || host.contains(']') {
        return None;
    }
    Some((host, port))
}

impl FromStr for Address {
    type Err = SocksError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Socket(addr) => write!(f, "{}", addr),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Socket(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_parse_ipv4() {
        let addr = Address::parse("93.184.216.34:443").unwrap();
        assert_eq!(
            addr,
            Address::Socket(SocketAddr::new(Ipv4Addr::new(93, 184, 216, 34).into(), 443))
        );
    }

    #[test]
    fn test_parse_ipv6_bracketed() {
        let addr = Address::parse("[2001:db8::1]:8443").unwrap();
        let ip: Ipv6Addr = "2001:db8::1".parse().unwrap();
        assert_eq!(addr, Address::Socket(SocketAddr::new(ip.into(), 8443)));
        assert!(Address::parse("2001:db8::1:8443").is_err());
    }

    #[test]
    fn test_parse_mapped_ipv6_folds_to_ipv4() {
        let addr = Address::parse("[::ffff:10.0.0.1]:80").unwrap();
        assert_eq!(addr.to_string(), "10.0.0.1:80");
    }

    #[test]
    fn test_parse_domain() {
        let addr = Address::parse("example.com:80").unwrap();
        assert_eq!(addr, Address::domain("example.com", 80));
        assert_eq!(addr.port(), 80);
    }

    #[test]
    fn test_parse_rejects_bad_ports() {
        for target in ["example.com:0", "example.com:65536", "example.com:http", "example.com:"] {
            assert!(
                matches!(Address::parse(target), Err(SocksError::InvalidPort(_))),
                "{target}"
            );
        }
        assert!(matches!(
            Address::parse("example.com"),
            Err(SocksError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_hosts() {
        assert!(matches!(Address::parse(":80"), Err(SocksError::InvalidTarget(_))));
        assert!(matches!(Address::parse("   :80"), Err(SocksError::InvalidTarget(_))));

        let long = format!("{}:80", "a".repeat(MAX_DOMAIN_LEN + 1));
        assert!(matches!(Address::parse(&long), Err(SocksError::InvalidTarget(_))));

        let max = format!("{}:80", "a".repeat(MAX_DOMAIN_LEN));
        assert!(Address::parse(&max).is_ok());
    }
}
