//! Error types for load balancer construction and diagnostics.

/// Errors reported by the load balancer.
///
/// Only construction and explicitly invoked diagnostics return errors; the
/// endpoint selection path never fails.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No seed nodes were supplied.
    #[error("node list cannot be empty")]
    EmptyNodeSet,

    /// A seed or discovered address is not an IPv4/IPv6 literal.
    #[error("invalid node address: {0:?}")]
    InvalidAddress(String),

    /// A port outside 1-65535.
    #[error("invalid port: {0}")]
    InvalidPort(u32),

    /// A scheme other than `http` or `https`.
    #[error("unsupported scheme: {0:?}")]
    InvalidScheme(String),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The discovery query produced no usable answer.
    #[error("node discovery failed: {0}")]
    DiscoveryFailure(String),

    /// The configured rack/datacenter filter matches no nodes.
    #[error(
        "node returned empty list for rack {rack:?} and datacenter {datacenter:?}, \
         rack or datacenter might be incorrect"
    )]
    FilterMisconfigured {
        /// Configured rack filter.
        rack: Option<String>,
        /// Configured datacenter filter.
        datacenter: Option<String>,
    },

    /// TLS material could not be loaded or the HTTP pool could not be built.
    #[error("failed to build connection pool: {0}")]
    Tls(String),

    /// The background refresh worker could not be started.
    #[error("failed to start refresh worker: {0}")]
    Worker(#[from] std::io::Error),
}

/// Result type for load balancer operations.
pub type Result<T> = std::result::Result<T, Error>;
