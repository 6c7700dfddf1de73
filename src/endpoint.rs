//! Node endpoints: scheme plus an IP literal and port.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Transport scheme used to reach a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// Returns the URL scheme string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("http") {
            Ok(Self::Http)
        } else if s.eq_ignore_ascii_case("https") {
            Ok(Self::Https)
        } else {
            Err(Error::InvalidScheme(s.to_string()))
        }
    }
}

/// A concrete destination for database requests.
///
/// Hosts are always IP literals: the discovery protocol returns addresses,
/// never names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: Scheme,
    addr: SocketAddr,
}

impl Endpoint {
    /// Creates an endpoint, validating the host and port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if `host` is not an IPv4/IPv6 literal
    /// and [`Error::InvalidPort`] if `port` is outside 1-65535.
    pub fn new(scheme: Scheme, host: &str, port: u32) -> Result<Self> {
        let ip = parse_ip(host).ok_or_else(|| Error::InvalidAddress(host.to_string()))?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(Error::InvalidPort(port))?;

        Ok(Self::from_socket_addr(scheme, SocketAddr::new(ip, port)))
    }

    /// Creates an endpoint from an already-resolved socket address.
    #[must_use]
    pub fn from_socket_addr(scheme: Scheme, addr: SocketAddr) -> Self {
        Self { scheme, addr }
    }

    /// The transport scheme.
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The node address.
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    /// The node port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The node socket address.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Builds a URL on this endpoint with the given path and optional query.
    #[must_use]
    pub fn url_with_path(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{self}{path}?{q}"),
            _ => format!("{self}{path}"),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.addr)
    }
}

/// Parses an IP literal, accepting bracketed IPv6 (`[::1]`).
fn parse_ip(host: &str) -> Option<IpAddr> {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.parse().ok()
}
