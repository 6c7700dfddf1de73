//! Diagnostics for rack/datacenter filtering.
//!
//! Clusters that do not support topology filters silently ignore the `rack`
//! and `dc` parameters. These checks let an operator confirm that a filter
//! is both understood by the cluster and matches real nodes.

use std::sync::Arc;

use crate::discovery::{Discover, Filter, FilterKind};
use crate::error::{Error, Result};
use crate::registry::NodeRegistry;

/// Validates topology filtering against the live cluster.
pub struct FeatureProbe {
    registry: Arc<NodeRegistry>,
    discovery: Arc<dyn Discover>,
    filter: Filter,
}

impl FeatureProbe {
    /// Creates a probe checking `filter` through nodes from `registry`.
    #[must_use]
    pub fn new(registry: Arc<NodeRegistry>, discovery: Arc<dyn Discover>, filter: Filter) -> Self {
        Self {
            registry,
            discovery,
            filter,
        }
    }

    /// Returns `true` if the cluster applies filters of the given kind.
    ///
    /// Asks one node twice, once with a filter value that matches nothing and
    /// once unfiltered; differing answers mean the filter is honored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoveryFailure`] if the unfiltered query returns no
    /// nodes, since nothing can be concluded then.
    pub async fn check_filter_honored(&self, kind: FilterKind) -> Result<bool> {
        let base = self.registry.next();

        let with_fake = self.discovery.discover(&base, &kind.unmatchable()).await;
        let without = self.discovery.discover(&base, &Filter::none()).await;

        if without.is_empty() {
            return Err(Error::DiscoveryFailure(format!("{base} returned empty list")));
        }

        let honored = with_fake.len() != without.len();
        tracing::debug!("{kind:?} filter honored by {base}: {honored}");
        Ok(honored)
    }

    /// Checks that the configured filter matches at least one node.
    ///
    /// Succeeds trivially when no filter is configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FilterMisconfigured`] when the filtered query returns
    /// no nodes.
    pub async fn validate_filter_correctness(&self) -> Result<()> {
        if self.filter.is_empty() {
            return Ok(());
        }

        let base = self.registry.next();
        if self.discovery.discover(&base, &self.filter).await.is_empty() {
            return Err(Error::FilterMisconfigured {
                rack: self.filter.rack.clone(),
                datacenter: self.filter.datacenter.clone(),
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for FeatureProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureProbe")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedCluster, endpoints};

    fn probe(cluster: &Arc<ScriptedCluster>, filter: Filter) -> FeatureProbe {
        let registry = Arc::new(NodeRegistry::new(endpoints(&["10.0.0.1"])).unwrap());
        FeatureProbe::new(registry, cluster.clone(), filter)
    }

    fn two_rack_cluster(honors_filters: bool) -> Arc<ScriptedCluster> {
        let cluster = ScriptedCluster::new(honors_filters);
        let nodes = endpoints(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        cluster.add(nodes[0], "rack1", "dc1");
        cluster.add(nodes[1], "rack1", "dc1");
        cluster.add(nodes[2], "rack2", "dc2");
        Arc::new(cluster)
    }

    #[tokio::test]
    async fn filter_honored_when_counts_differ() {
        let cluster = two_rack_cluster(true);
        let probe = probe(&cluster, Filter::none());

        assert!(probe.check_filter_honored(FilterKind::Rack).await.unwrap());
        assert!(probe.check_filter_honored(FilterKind::Datacenter).await.unwrap());
    }

    #[tokio::test]
    async fn filter_not_honored_when_counts_equal() {
        let cluster = two_rack_cluster(false);
        let probe = probe(&cluster, Filter::none());

        assert!(!probe.check_filter_honored(FilterKind::Rack).await.unwrap());
    }

    #[tokio::test]
    async fn probe_queries_same_node_twice() {
        let cluster = two_rack_cluster(true);
        let probe = probe(&cluster, Filter::none());

        probe.check_filter_honored(FilterKind::Rack).await.unwrap();

        let requests = cluster.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].0, requests[1].0);
        assert_eq!(requests[0].1, FilterKind::Rack.unmatchable());
        assert_eq!(requests[1].1, Filter::none());
    }

    #[tokio::test]
    async fn probe_fails_on_empty_cluster_answer() {
        let cluster = Arc::new(ScriptedCluster::new(true));
        let probe = probe(&cluster, Filter::none());

        let err = probe.check_filter_honored(FilterKind::Rack).await.unwrap_err();
        assert!(matches!(err, Error::DiscoveryFailure(_)));
    }

    #[tokio::test]
    async fn validate_accepts_existing_rack() {
        let cluster = two_rack_cluster(true);
        let probe = probe(&cluster, Filter::none().rack("rack2"));

        probe.validate_filter_correctness().await.unwrap();
    }

    #[tokio::test]
    async fn validate_rejects_unknown_datacenter() {
        let cluster = two_rack_cluster(true);
        let probe = probe(&cluster, Filter::none().datacenter("dc9"));

        let err = probe.validate_filter_correctness().await.unwrap_err();
        assert!(matches!(
            err,
            Error::FilterMisconfigured { rack: None, datacenter: Some(dc) } if dc == "dc9"
        ));
    }

    #[tokio::test]
    async fn validate_without_filter_skips_discovery() {
        let cluster = two_rack_cluster(true);
        let probe = probe(&cluster, Filter::none());

        probe.validate_filter_correctness().await.unwrap();
        assert_eq!(cluster.calls(), 0);
    }
}
