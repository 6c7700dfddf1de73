//! Node discovery through the `/localnodes` query.
//!
//! Every Alternator node answers `GET /localnodes` with a JSON array of the
//! addresses of its live peers, optionally restricted to a rack and/or
//! datacenter with the `rack` and `dc` query parameters. Failures of any kind
//! are reported as an empty result: a refresh that learns nothing keeps the
//! node list it already has.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::endpoint::{Endpoint, Scheme};
use crate::error::{Error, Result};
use crate::pool::ConnectionPoolCache;

/// Path of the discovery query.
pub const LOCAL_NODES_PATH: &str = "/localnodes";

/// Rack/datacenter restriction applied to a discovery query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    /// Only return nodes in this rack.
    pub rack: Option<String>,
    /// Only return nodes in this datacenter.
    pub datacenter: Option<String>,
}

impl Filter {
    /// A filter that restricts nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the rack.
    #[must_use]
    pub fn rack(mut self, rack: impl Into<String>) -> Self {
        self.rack = Some(rack.into());
        self
    }

    /// Sets the datacenter.
    #[must_use]
    pub fn datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    /// Returns `true` if no restriction is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rack.is_none() && self.datacenter.is_none()
    }

    /// Query parameters in wire order: `rack` first, then `dc`.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(rack) = &self.rack {
            pairs.push(("rack", rack.as_str()));
        }
        if let Some(dc) = &self.datacenter {
            pairs.push(("dc", dc.as_str()));
        }
        pairs
    }
}

/// Which topology filter a probe exercises.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    /// The `rack` parameter.
    Rack,
    /// The `dc` parameter.
    Datacenter,
}

impl FilterKind {
    /// A filter of this kind whose value matches no real node.
    #[must_use]
    pub fn unmatchable(self) -> Filter {
        match self {
            Self::Rack => Filter::none().rack("fakeRack"),
            Self::Datacenter => Filter::none().datacenter("fakeDc"),
        }
    }
}

/// Source of live node lists.
///
/// Implementations never fail: anything that prevents an answer yields an
/// empty list.
pub trait Discover: Send + Sync {
    /// Asks `base` for its live peers restricted by `filter`.
    fn discover<'a>(
        &'a self,
        base: &'a Endpoint,
        filter: &'a Filter,
    ) -> BoxFuture<'a, Vec<Endpoint>>;
}

/// HTTP implementation of [`Discover`] over pooled connections.
///
/// Discovered addresses are turned into endpoints using the configured scheme
/// and port, since the query returns bare addresses.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    pools: Arc<ConnectionPoolCache>,
    scheme: Scheme,
    port: u16,
}

impl DiscoveryClient {
    /// Creates a discovery client.
    #[must_use]
    pub fn new(pools: Arc<ConnectionPoolCache>, scheme: Scheme, port: u16) -> Self {
        Self {
            pools,
            scheme,
            port,
        }
    }

    /// Builds the discovery URL for `base` with `filter` applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoveryFailure`] if the URL cannot be formed.
    pub fn local_nodes_url(base: &Endpoint, filter: &Filter) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&base.url_with_path(LOCAL_NODES_PATH, None))
            .map_err(|e| Error::DiscoveryFailure(format!("invalid discovery URL: {e}")))?;

        let pairs = filter.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        Ok(url)
    }

    async fn try_discover(&self, base: &Endpoint, filter: &Filter) -> Result<Vec<Endpoint>> {
        let url = Self::local_nodes_url(base, filter)?;
        let pool = self.pools.pool_for(base)?;

        let response = pool
            .client()
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::DiscoveryFailure(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DiscoveryFailure(format!("{url}: status {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::DiscoveryFailure(format!("{url}: {e}")))?;

        parse_nodes(&body, self.scheme, self.port)
            .map_err(|e| Error::DiscoveryFailure(format!("{url}: {e}")))
    }
}

impl Discover for DiscoveryClient {
    fn discover<'a>(
        &'a self,
        base: &'a Endpoint,
        filter: &'a Filter,
    ) -> BoxFuture<'a, Vec<Endpoint>> {
        Box::pin(async move {
            match self.try_discover(base, filter).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    tracing::warn!("failed to fetch nodes from {base}: {e}");
                    Vec::new()
                }
            }
        })
    }
}

/// Parses a discovery response body into endpoints.
///
/// The body must be a JSON array. Entries that are not strings holding IP
/// literals are skipped.
///
/// This function is extracted to enable unit testing of the parsing logic.
fn parse_nodes(body: &[u8], scheme: Scheme, port: u16) -> serde_json::Result<Vec<Endpoint>> {
    let entries: Vec<serde_json::Value> = serde_json::from_slice(body)?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let address = entry.as_str();
            if address.is_none() {
                tracing::debug!("skipping discovered node: {entry} is not a string");
            }
            address
        })
        .filter(|a| !a.is_empty())
        .filter_map(|a| match Endpoint::new(scheme, a, u32::from(port)) {
            Ok(ep) => Some(ep),
            Err(e) => {
                tracing::debug!("skipping discovered node: {e}");
                None
            }
        })
        .collect())
}
