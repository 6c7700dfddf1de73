//! The load balancer: round-robin endpoint selection over a self-refreshing
//! node list.
//!
//! # How It Works
//!
//! 1. Seed nodes from [`Config`] are validated and installed in a [`NodeRegistry`]
//! 2. [`LoadBalancer::next`] hands out the node at the rotation cursor and advances it
//! 3. Outside the registry lock, it queues a background refresh when one is due
//! 4. The shared refresh worker asks one known node for `/localnodes` and swaps
//!    in the answer
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use alternator_lb::{Config, LoadBalancer};
//!
//! let config = Config::new(["10.0.0.1", "10.0.0.2"])
//!     .port(8000)
//!     .datacenter("dc1")
//!     .update_interval(Duration::from_secs(10));
//!
//! let lb = LoadBalancer::new(config)?;
//! lb.start().await?;
//!
//! // Pick a node for the next request
//! let endpoint = lb.next();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;
use crate::discovery::{Discover, DiscoveryClient, Filter, FilterKind};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::pool::ConnectionPoolCache;
use crate::probe::FeatureProbe;
use crate::refresh::RefreshCoordinator;
use crate::registry::NodeRegistry;
use crate::worker::WorkerPool;

/// Source of request destinations for an integration layer.
///
/// Implement this at the point where a database client decides where to send
/// a request or open a connection.
pub trait EndpointResolver: Send + Sync {
    /// Returns the endpoint to use next.
    fn resolve(&self) -> Endpoint;
}

/// Client-side load balancer over the live nodes of an Alternator cluster.
pub struct LoadBalancer {
    config: Config,
    registry: Arc<NodeRegistry>,
    pools: Arc<ConnectionPoolCache>,
    coordinator: Arc<RefreshCoordinator>,
    probe: FeatureProbe,
    worker: Arc<WorkerPool>,
    started: AtomicBool,
}

impl LoadBalancer {
    /// Creates a load balancer that discovers nodes over HTTP and refreshes on
    /// the process-wide worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyNodeSet`](crate::Error::EmptyNodeSet) when no seed
    /// nodes are configured, and
    /// [`Error::InvalidAddress`](crate::Error::InvalidAddress) or
    /// [`Error::InvalidPort`](crate::Error::InvalidPort) for malformed seeds.
    pub fn new(config: Config) -> Result<Self> {
        let pools = Arc::new(ConnectionPoolCache::new(&config));
        let discovery = Arc::new(DiscoveryClient::new(
            pools.clone(),
            config.scheme,
            config.port,
        ));

        Self::build(config, pools, discovery, WorkerPool::shared())
    }

    /// Creates a load balancer with a custom discovery source and worker pool.
    ///
    /// # Errors
    ///
    /// Same as [`LoadBalancer::new`].
    pub fn with_discovery(
        config: Config,
        discovery: Arc<dyn Discover>,
        worker: Arc<WorkerPool>,
    ) -> Result<Self> {
        let pools = Arc::new(ConnectionPoolCache::new(&config));
        Self::build(config, pools, discovery, worker)
    }

    fn build(
        config: Config,
        pools: Arc<ConnectionPoolCache>,
        discovery: Arc<dyn Discover>,
        worker: Arc<WorkerPool>,
    ) -> Result<Self> {
        let seeds = config
            .nodes
            .iter()
            .map(|node| Endpoint::new(config.scheme, node, u32::from(config.port)))
            .collect::<Result<Vec<_>>>()?;

        let registry = Arc::new(NodeRegistry::new(seeds)?);
        let filter = Filter {
            rack: config.rack.clone(),
            datacenter: config.datacenter.clone(),
        };

        let coordinator = Arc::new(RefreshCoordinator::new(
            registry.clone(),
            discovery.clone(),
            filter.clone(),
            config.update_interval,
            worker.clone(),
        ));
        let probe = FeatureProbe::new(registry.clone(), discovery, filter);

        Ok(Self {
            config,
            registry,
            pools,
            coordinator,
            probe,
            worker,
            started: AtomicBool::new(false),
        })
    }

    /// Acquires the refresh worker and, if configured, runs one discovery pass.
    ///
    /// Calling `start` on a running load balancer does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Worker`](crate::Error::Worker) if the worker thread
    /// cannot be started.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Err(e) = self.worker.acquire() {
            self.started.store(false, Ordering::Release);
            tracing::error!("failed to start refresh worker: {e}");
            return Err(e);
        }

        tracing::debug!(
            "starting load balancer over {} seed nodes",
            self.registry.seeds().len()
        );

        if self.config.eager_discovery {
            self.force_refresh().await;
        }

        Ok(())
    }

    /// Releases the refresh worker. Background refreshes stop being scheduled.
    pub fn stop(&self) {
        if self.started.swap(false, Ordering::AcqRel) {
            self.worker.release();
            tracing::debug!("stopped load balancer");
        }
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Returns the next endpoint in rotation.
    ///
    /// Never blocks on the network and never fails; when a refresh is due it
    /// is queued on the background worker.
    #[must_use]
    pub fn next(&self) -> Endpoint {
        let node = self.registry.next();

        if self.is_started() {
            self.coordinator.maybe_schedule_refresh();
        }

        node
    }

    /// Returns a copy of the known live nodes.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.registry.snapshot()
    }

    /// Refreshes the node list now, unless a refresh is already running.
    ///
    /// Returns `true` if a new node list was installed.
    pub async fn force_refresh(&self) -> bool {
        self.coordinator.force_refresh().await
    }

    /// Returns `true` if the cluster honors filters of the given kind.
    ///
    /// # Errors
    ///
    /// See [`FeatureProbe::check_filter_honored`].
    pub async fn check_filter_honored(&self, kind: FilterKind) -> Result<bool> {
        self.probe.check_filter_honored(kind).await
    }

    /// Checks that the configured rack/datacenter matches at least one node.
    ///
    /// # Errors
    ///
    /// See [`FeatureProbe::validate_filter_correctness`].
    pub async fn validate_filter_correctness(&self) -> Result<()> {
        self.probe.validate_filter_correctness().await
    }

    /// The per-node connection pools.
    #[must_use]
    pub fn pools(&self) -> &ConnectionPoolCache {
        &self.pools
    }

    /// The configuration this load balancer was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl EndpointResolver for LoadBalancer {
    fn resolve(&self) -> Endpoint {
        self.next()
    }
}

impl<T: EndpointResolver + ?Sized> EndpointResolver for Arc<T> {
    fn resolve(&self) -> Endpoint {
        (**self).resolve()
    }
}

impl Drop for LoadBalancer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("registry", &self.registry)
            .field("coordinator", &self.coordinator)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}
