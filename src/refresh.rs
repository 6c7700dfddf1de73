//! Background refresh scheduling.
//!
//! A refresh asks one known node for the live node list and installs the
//! answer. At most one refresh runs at a time per load balancer, and the
//! next one becomes eligible `update_interval` after the previous attempt
//! finished, whether it succeeded or not.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::discovery::{Discover, Filter};
use crate::registry::NodeRegistry;
use crate::worker::WorkerPool;

/// Decides when to refresh and dispatches refreshes to the worker pool.
pub struct RefreshCoordinator {
    registry: Arc<NodeRegistry>,
    discovery: Arc<dyn Discover>,
    filter: Filter,
    update_interval: Duration,
    worker: Arc<WorkerPool>,
}

/// Marks a refresh as finished when dropped, including when the task never ran.
struct InFlight {
    registry: Arc<NodeRegistry>,
    update_interval: Duration,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.registry.finish_refresh(Instant::now() + self.update_interval);
    }
}

impl RefreshCoordinator {
    /// Creates a coordinator. A zero `update_interval` disables scheduled refreshes.
    #[must_use]
    pub fn new(
        registry: Arc<NodeRegistry>,
        discovery: Arc<dyn Discover>,
        filter: Filter,
        update_interval: Duration,
        worker: Arc<WorkerPool>,
    ) -> Self {
        Self {
            registry,
            discovery,
            filter,
            update_interval,
            worker,
        }
    }

    /// The filter applied to refresh queries.
    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Queues a background refresh if one is due and none is running.
    ///
    /// Never blocks on the network. Returns `true` if a refresh was queued.
    pub fn maybe_schedule_refresh(self: &Arc<Self>) -> bool {
        let now = Instant::now();
        if self.update_interval.is_zero() || !self.registry.refresh_may_be_due(now) {
            return false;
        }

        if !self.registry.try_begin_refresh(now, true) {
            return false;
        }

        let in_flight = self.in_flight();
        let this = self.clone();
        let queued = self.worker.submit(async move {
            this.run(in_flight).await;
        });

        if !queued {
            tracing::debug!("refresh worker not running, skipping node list refresh");
        }

        queued
    }

    /// Refreshes now, ignoring the schedule but not a refresh already running.
    ///
    /// Returns `true` if a new node list was installed.
    pub async fn force_refresh(&self) -> bool {
        if !self.registry.try_begin_refresh(Instant::now(), false) {
            return false;
        }

        let in_flight = self.in_flight();
        self.run(in_flight).await
    }

    fn in_flight(&self) -> InFlight {
        InFlight {
            registry: self.registry.clone(),
            update_interval: self.update_interval,
        }
    }

    async fn run(&self, in_flight: InFlight) -> bool {
        let base = self.registry.next();
        let nodes = self.discovery.discover(&base, &self.filter).await;

        let replaced = if nodes.is_empty() {
            tracing::debug!("{base} returned no nodes, keeping current node list");
            false
        } else {
            tracing::debug!("updated node list from {base}: {nodes:?}");
            self.registry.replace(nodes)
        };

        drop(in_flight);
        replaced
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("filter", &self.filter)
            .field("update_interval", &self.update_interval)
            .finish_non_exhaustive()
    }
}
