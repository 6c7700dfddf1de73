//! In-memory cluster used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::discovery::{Discover, Filter};
use crate::endpoint::{Endpoint, Scheme};

/// Builds plain HTTP endpoints on port 8080.
pub(crate) fn endpoints(hosts: &[&str]) -> Vec<Endpoint> {
    hosts
        .iter()
        .map(|h| Endpoint::new(Scheme::Http, h, 8080).unwrap())
        .collect()
}

#[derive(Clone, Debug)]
struct Member {
    endpoint: Endpoint,
    rack: String,
    datacenter: String,
}

/// A synthetic cluster answering discovery queries from memory.
///
/// Every node answers with the same member list. Filters are applied only
/// when `honors_filters` is set, mimicking clusters that ignore them.
pub(crate) struct ScriptedCluster {
    members: Mutex<Vec<Member>>,
    /// Per-node override of the answer, for nodes that misbehave.
    overrides: Mutex<HashMap<Endpoint, Vec<Endpoint>>>,
    honors_filters: bool,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<(Endpoint, Filter)>>,
}

impl ScriptedCluster {
    pub(crate) fn new(honors_filters: bool) -> Self {
        Self {
            members: Mutex::new(Vec::new()),
            overrides: Mutex::new(HashMap::new()),
            honors_filters,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Cluster whose members all live in `rack1` of `dc1`.
    pub(crate) fn with_nodes(hosts: &[&str]) -> Self {
        let cluster = Self::new(true);
        for ep in endpoints(hosts) {
            cluster.add(ep, "rack1", "dc1");
        }
        cluster
    }

    /// Makes every answer take `delay`.
    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn add(&self, endpoint: Endpoint, rack: &str, datacenter: &str) {
        self.members.lock().push(Member {
            endpoint,
            rack: rack.to_string(),
            datacenter: datacenter.to_string(),
        });
    }

    /// Makes `node` answer with `answer` regardless of filters.
    pub(crate) fn answer_from(&self, node: Endpoint, answer: Vec<Endpoint>) {
        self.overrides.lock().insert(node, answer);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<(Endpoint, Filter)> {
        self.requests.lock().clone()
    }

    fn answer(&self, base: &Endpoint, filter: &Filter) -> Vec<Endpoint> {
        if let Some(answer) = self.overrides.lock().get(base) {
            return answer.clone();
        }

        self.members
            .lock()
            .iter()
            .filter(|m| {
                !self.honors_filters
                    || (filter.rack.as_ref().is_none_or(|r| *r == m.rack)
                        && filter.datacenter.as_ref().is_none_or(|d| *d == m.datacenter))
            })
            .map(|m| m.endpoint)
            .collect()
    }
}

impl Discover for ScriptedCluster {
    fn discover<'a>(
        &'a self,
        base: &'a Endpoint,
        filter: &'a Filter,
    ) -> BoxFuture<'a, Vec<Endpoint>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push((*base, filter.clone()));

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.answer(base, filter)
        })
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub(crate) async fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Installs a test log subscriber honoring `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
