//! Load balancer configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::endpoint::Scheme;
use crate::error::{Error, Result};

/// Default port of the Alternator API.
pub const DEFAULT_PORT: u16 = 8080;

/// Default interval between node list refreshes.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_POOL_CONNECTIONS: usize = 100;

/// Client certificate and private key (PEM files) presented over TLS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Path to the PEM-encoded certificate chain.
    pub certificate: PathBuf,
    /// Path to the PEM-encoded private key.
    pub key: PathBuf,
}

/// Configuration for the load balancer.
#[derive(Clone, Debug)]
pub struct Config {
    /// Seed node addresses (IP literals). Must not be empty.
    pub nodes: Vec<String>,

    /// Scheme used for both discovery and the returned endpoints.
    pub scheme: Scheme,

    /// Port used for both discovery and the returned endpoints.
    pub port: u16,

    /// Only use nodes in this datacenter.
    pub datacenter: Option<String>,

    /// Only use nodes in this rack.
    pub rack: Option<String>,

    /// Minimum time between background refreshes. Zero disables them.
    pub update_interval: Duration,

    /// TCP connect timeout for pooled connections.
    pub connect_timeout: Duration,

    /// Overall timeout of a single discovery request.
    pub request_timeout: Duration,

    /// Maximum idle connections kept per node.
    pub max_pool_connections: usize,

    /// Client certificate for mutual TLS.
    pub client_identity: Option<ClientIdentity>,

    /// Accept any server certificate (self-signed clusters).
    pub ignore_server_certificate_error: bool,

    /// Run one discovery pass from [`start`](crate::LoadBalancer::start).
    pub eager_discovery: bool,
}

impl Config {
    /// Creates a configuration with the given seed nodes and defaults for
    /// everything else.
    #[must_use]
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
            scheme: Scheme::Http,
            port: DEFAULT_PORT,
            datacenter: None,
            rack: None,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_pool_connections: DEFAULT_MAX_POOL_CONNECTIONS,
            client_identity: None,
            ignore_server_certificate_error: false,
            eager_discovery: false,
        }
    }

    /// Sets the scheme.
    #[must_use]
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Sets the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Restricts discovery to a datacenter.
    #[must_use]
    pub fn datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    /// Restricts discovery to a rack.
    #[must_use]
    pub fn rack(mut self, rack: impl Into<String>) -> Self {
        self.rack = Some(rack.into());
        self
    }

    /// Sets the refresh interval; `Duration::ZERO` disables background refresh.
    #[must_use]
    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the discovery request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum idle connections per node.
    #[must_use]
    pub fn max_pool_connections(mut self, max: usize) -> Self {
        self.max_pool_connections = max;
        self
    }

    /// Presents a client certificate over TLS.
    #[must_use]
    pub fn client_certificate(
        mut self,
        certificate: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.client_identity = Some(ClientIdentity {
            certificate: certificate.into(),
            key: key.into(),
        });
        self
    }

    /// Accepts invalid server certificates.
    #[must_use]
    pub fn ignore_server_certificate_error(mut self, ignore: bool) -> Self {
        self.ignore_server_certificate_error = ignore;
        self
    }

    /// Runs one discovery pass when the load balancer starts.
    #[must_use]
    pub fn eager_discovery(mut self, eager: bool) -> Self {
        self.eager_discovery = eager;
        self
    }

    /// Returns `true` when a rack or datacenter filter is configured.
    #[must_use]
    pub fn has_filter(&self) -> bool {
        self.rack.is_some() || self.datacenter.is_some()
    }

    /// Builds a configuration from `ALTERNATOR_*` environment variables.
    ///
    /// Recognized variables: `ALTERNATOR_NODES` (comma separated, required),
    /// `ALTERNATOR_SCHEME`, `ALTERNATOR_PORT`, `ALTERNATOR_RACK`,
    /// `ALTERNATOR_DATACENTER` and `ALTERNATOR_UPDATE_INTERVAL_SECS`.
    ///
    /// # Errors
    ///
    /// Fails when no nodes are given or a value cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nodes: Vec<String> = lookup("ALTERNATOR_NODES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();

        if nodes.is_empty() {
            return Err(Error::EmptyNodeSet);
        }

        let mut config = Self::new(nodes);

        if let Some(scheme) = lookup("ALTERNATOR_SCHEME") {
            config.scheme = scheme.parse()?;
        }

        if let Some(port) = lookup("ALTERNATOR_PORT") {
            let parsed: u32 = parse_var("ALTERNATOR_PORT", &port)?;
            config.port = u16::try_from(parsed).map_err(|_| Error::InvalidPort(parsed))?;
        }

        config.rack = lookup("ALTERNATOR_RACK").filter(|r| !r.is_empty());
        config.datacenter = lookup("ALTERNATOR_DATACENTER").filter(|d| !d.is_empty());

        if let Some(secs) = lookup("ALTERNATOR_UPDATE_INTERVAL_SECS") {
            let secs: u64 = parse_var("ALTERNATOR_UPDATE_INTERVAL_SECS", &secs)?;
            config.update_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{name}={value:?} is not a valid number")))
}
