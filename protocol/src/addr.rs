//! Endpoint addresses: `host:port` pairs with IPv6 bracket support.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// A peer or listener address, normalized to `host:port` (IPv6 hosts keep
/// their brackets). Equality and hashing operate on the normalized string,
/// so two textually different but equivalent addresses compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        Self { host, port }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Normalized wire form: `host:port`, IPv6 hosts bracketed.
    pub fn normalized(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        let ip: IpAddr = self.host.parse().ok()?;
        Some(SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized())
    }
}

/// Parse errors for `Endpoint::from_str`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointParseError {
    #[error("missing port in address")]
    MissingPort,
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("invalid host: {0}")]
    InvalidHost(String),
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('[') {
            let (host, rest) = rest
                .split_once(']')
                .ok_or_else(|| EndpointParseError::InvalidHost(s.to_string()))?;
            let rest = rest
                .strip_prefix(':')
                .ok_or(EndpointParseError::MissingPort)?;
            let port: u16 = rest
                .parse()
                .map_err(|_| EndpointParseError::InvalidPort(rest.to_string()))?;
            if host.parse::<IpAddr>().is_err() {
                return Err(EndpointParseError::InvalidHost(host.to_string()));
            }
            return Ok(Endpoint::new(host, port));
        }

        let (host, port_str) = s
            .rsplit_once(':')
            .ok_or(EndpointParseError::MissingPort)?;
        if host.is_empty() {
            return Err(EndpointParseError::InvalidHost(s.to_string()));
        }
        let port: u16 = port_str
            .parse()
            .map_err(|_| EndpointParseError::InvalidPort(port_str.to_string()))?;
        if host.parse::<IpAddr>().is_err() {
            return Err(EndpointParseError::InvalidHost(host.to_string()));
        }
        Ok(Endpoint::new(host, port))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint::new(addr.ip().to_string(), addr.port())
    }
}
