//! Per-node HTTP connection pools.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::{ClientIdentity, Config};
use crate::endpoint::{Endpoint, Scheme};
use crate::error::{Error, Result};

/// Idle pooled connections are kept this long.
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// A reusable connection pool bound to one node.
#[derive(Debug)]
pub struct ConnectionPool {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl ConnectionPool {
    /// The node this pool connects to.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// The underlying HTTP client.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Settings applied to every pool the cache creates.
#[derive(Clone, Debug)]
struct PoolSettings {
    connect_timeout: Duration,
    request_timeout: Duration,
    max_idle_per_host: usize,
    identity: Option<ClientIdentity>,
    accept_invalid_certs: bool,
}

/// Lazily created connection pools keyed by scheme, address and port.
///
/// A pool is created at most once per key and reused for the lifetime of the
/// cache. Pools are never evicted.
#[derive(Debug)]
pub struct ConnectionPoolCache {
    settings: PoolSettings,
    pools: RwLock<HashMap<Endpoint, Arc<ConnectionPool>>>,
}

impl ConnectionPoolCache {
    /// Creates an empty cache using the pool settings from `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            settings: PoolSettings {
                connect_timeout: config.connect_timeout,
                request_timeout: config.request_timeout,
                max_idle_per_host: config.max_pool_connections,
                identity: config.client_identity.clone(),
                accept_invalid_certs: config.ignore_server_certificate_error,
            },
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the pool for `endpoint`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if the client identity cannot be loaded or the
    /// HTTP client cannot be built.
    pub fn pool_for(&self, endpoint: &Endpoint) -> Result<Arc<ConnectionPool>> {
        if let Some(pool) = self.pools.read().get(endpoint) {
            return Ok(pool.clone());
        }

        let mut pools = self.pools.write();

        // Another caller may have created it while we waited for the write lock.
        if let Some(pool) = pools.get(endpoint) {
            return Ok(pool.clone());
        }

        let pool = Arc::new(ConnectionPool {
            endpoint: *endpoint,
            client: self.build_client(endpoint.scheme())?,
        });

        tracing::debug!("created connection pool for {endpoint}");
        pools.insert(*endpoint, pool.clone());
        Ok(pool)
    }

    /// Number of pools created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    /// Returns `true` if no pool has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }

    fn build_client(&self, scheme: Scheme) -> Result<reqwest::Client> {
        let settings = &self.settings;
        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .pool_max_idle_per_host(settings.max_idle_per_host)
            .pool_idle_timeout(IDLE_CONNECTION_TIMEOUT);

        if scheme == Scheme::Https {
            builder = builder
                .use_rustls_tls()
                .danger_accept_invalid_certs(settings.accept_invalid_certs);

            if let Some(identity) = &settings.identity {
                builder = builder.identity(load_identity(identity)?);
            }
        }

        builder.build().map_err(|e| Error::Tls(e.to_string()))
    }
}

/// Reads the certificate and key PEM files into a client identity.
fn load_identity(identity: &ClientIdentity) -> Result<reqwest::Identity> {
    let read = |path: &std::path::Path| {
        std::fs::read(path)
            .map_err(|e| Error::Tls(format!("failed to read {}: {e}", path.display())))
    };

    let mut pem = read(identity.certificate.as_path())?;
    pem.push(b'\n');
    pem.extend(read(identity.key.as_path())?);

    reqwest::Identity::from_pem(&pem).map_err(|e| Error::Tls(e.to_string()))
}
