//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend endpoint (`host:port`)
//! - Identity is the address string, so hostnames (e.g. container names)
//!   are kept unresolved until connect time

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// A single backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Backend {
    host: String,
    port: u16,
}

/// Error returned when an address string is not `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid backend address '{0}': expected host:port")]
pub struct AddressParseError(pub String);

impl Backend {
    /// Create a new backend.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address in a form accepted by `TcpStream::connect`.
    pub fn connect_addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

impl FromStr for Backend {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressParseError(s.to_string()));
        }
        let port = port.parse().map_err(|_| AddressParseError(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<std::net::SocketAddr> for Backend {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl Serialize for Backend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let b: Backend = "service-a:8083".parse().unwrap();
        assert_eq!(b.host(), "service-a");
        assert_eq!(b.port(), 8083);
        assert_eq!(b.to_string(), "service-a:8083");
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let b: Backend = "[::1]:9000".parse().unwrap();
        assert_eq!(b.host(), "::1");
        assert_eq!(b.to_string(), "[::1]:9000");
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!("localhost".parse::<Backend>().is_err());
        assert!(":8080".parse::<Backend>().is_err());
        assert!("host:http".parse::<Backend>().is_err());
        assert!("host:70000".parse::<Backend>().is_err());
    }
}
