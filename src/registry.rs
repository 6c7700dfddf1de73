//! Guarded live node list with a round-robin cursor.
//!
//! The registry owns the current node list, the rotation cursor and the
//! refresh scheduling state. Every mutation goes through one mutex whose
//! critical sections are O(1), or O(n) for snapshot copies; no I/O ever
//! happens while it is held.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

struct State {
    /// Replaced wholesale on refresh, never mutated in place.
    nodes: Arc<[Endpoint]>,
    cursor: usize,
    next_eligible: Instant,
}

/// Live node list with a monotonically increasing rotation cursor.
pub struct NodeRegistry {
    seeds: Arc<[Endpoint]>,
    state: Mutex<State>,
    /// Mirrors the in-flight flag so callers can skip the lock on the fast path.
    /// Only written while `state` is locked.
    in_flight: AtomicBool,
    /// Reference point for `next_eligible_nanos`.
    epoch: Instant,
    /// Mirrors `State::next_eligible` as nanoseconds since `epoch`.
    /// Only written while `state` is locked.
    next_eligible_nanos: AtomicU64,
}

impl NodeRegistry {
    /// Creates a registry seeded with the given endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyNodeSet`] when `seeds` is empty.
    pub fn new(seeds: Vec<Endpoint>) -> Result<Self> {
        if seeds.is_empty() {
            return Err(Error::EmptyNodeSet);
        }

        let seeds: Arc<[Endpoint]> = seeds.into();
        let epoch = Instant::now();

        Ok(Self {
            state: Mutex::new(State {
                nodes: seeds.clone(),
                cursor: 0,
                next_eligible: epoch,
            }),
            seeds,
            in_flight: AtomicBool::new(false),
            epoch,
            next_eligible_nanos: AtomicU64::new(0),
        })
    }

    /// Returns the endpoint at the cursor and advances it.
    #[must_use]
    pub fn next(&self) -> Endpoint {
        let mut state = self.state.lock();

        if state.nodes.is_empty() {
            state.nodes = self.seeds.clone();
        }

        let node = state.nodes[state.cursor % state.nodes.len()];
        state.cursor = state.cursor.wrapping_add(1);
        node
    }

    /// Returns a copy of the current node list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Endpoint> {
        let nodes = self.state.lock().nodes.clone();
        nodes.to_vec()
    }

    /// Installs a new node list, leaving the cursor untouched.
    ///
    /// An empty list is ignored and `false` is returned.
    pub fn replace(&self, nodes: Vec<Endpoint>) -> bool {
        if nodes.is_empty() {
            return false;
        }

        let nodes: Arc<[Endpoint]> = nodes.into();
        let previous = std::mem::replace(&mut self.state.lock().nodes, nodes);
        drop(previous);
        true
    }

    /// The seed endpoints the registry was created with.
    #[must_use]
    pub fn seeds(&self) -> &[Endpoint] {
        &self.seeds
    }

    /// Returns `true` while a refresh is running.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Lock-free pre-check: no refresh is running and `now` has reached the
    /// next eligible time. [`try_begin_refresh`](Self::try_begin_refresh)
    /// decides under the lock.
    pub(crate) fn refresh_may_be_due(&self, now: Instant) -> bool {
        !self.in_flight.load(Ordering::Acquire)
            && self.nanos_since_epoch(now) >= self.next_eligible_nanos.load(Ordering::Acquire)
    }

    /// Marks a refresh as in flight if none is running and, when
    /// `respect_schedule` is set, `now` has reached the next eligible time.
    pub(crate) fn try_begin_refresh(&self, now: Instant, respect_schedule: bool) -> bool {
        let state = self.state.lock();

        if self.in_flight.load(Ordering::Acquire) {
            return false;
        }

        if respect_schedule && now < state.next_eligible {
            return false;
        }

        self.in_flight.store(true, Ordering::Release);
        true
    }

    /// Clears the in-flight flag and pushes back the next eligible time.
    pub(crate) fn finish_refresh(&self, next_eligible: Instant) {
        let mut state = self.state.lock();
        state.next_eligible = next_eligible;
        self.next_eligible_nanos
            .store(self.nanos_since_epoch(next_eligible), Ordering::Release);
        self.in_flight.store(false, Ordering::Release);
    }

    fn nanos_since_epoch(&self, at: Instant) -> u64 {
        u64::try_from(at.saturating_duration_since(self.epoch).as_nanos()).unwrap_or(u64::MAX)
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NodeRegistry")
            .field("nodes", &state.nodes)
            .field("cursor", &state.cursor)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::endpoint::Scheme;

    fn endpoints(hosts: &[&str]) -> Vec<Endpoint> {
        hosts
            .iter()
            .map(|h| Endpoint::new(Scheme::Http, h, 8080).unwrap())
            .collect()
    }

    #[test]
    fn new_rejects_empty_seeds() {
        assert!(matches!(NodeRegistry::new(Vec::new()), Err(Error::EmptyNodeSet)));
    }

    #[test]
    fn next_cycles_in_list_order() {
        let nodes = endpoints(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        let registry = NodeRegistry::new(nodes.clone()).unwrap();

        // Start at an arbitrary offset.
        let _ = registry.next();

        let first = registry.next();
        let offset = nodes.iter().position(|n| *n == first).unwrap();
        let mut seen = vec![first];
        for _ in 1..nodes.len() {
            seen.push(registry.next());
        }

        let expected: Vec<Endpoint> = (0..nodes.len())
            .map(|i| nodes[(offset + i) % nodes.len()])
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn single_node_always_returned() {
        let nodes = endpoints(&["10.0.0.1"]);
        let registry = NodeRegistry::new(nodes.clone()).unwrap();

        for _ in 0..5 {
            assert_eq!(registry.next(), nodes[0]);
        }
    }

    #[test]
    fn snapshot_returns_copy() {
        let nodes = endpoints(&["10.0.0.1", "10.0.0.2"]);
        let registry = NodeRegistry::new(nodes.clone()).unwrap();

        assert_eq!(registry.snapshot(), nodes);
        assert_eq!(registry.seeds(), nodes.as_slice());
    }

    #[test]
    fn replace_swaps_list_and_keeps_cursor() {
        let registry = NodeRegistry::new(endpoints(&["10.0.0.1", "10.0.0.2"])).unwrap();
        let _ = registry.next();

        let replacement = endpoints(&["10.0.0.3", "10.0.0.4", "10.0.0.5"]);
        assert!(registry.replace(replacement.clone()));
        assert_eq!(registry.snapshot(), replacement);

        // Cursor is at 1, so rotation continues from the second entry.
        assert_eq!(registry.next(), replacement[1]);
        assert_eq!(registry.next(), replacement[2]);
        assert_eq!(registry.next(), replacement[0]);
    }

    #[test]
    fn replace_ignores_empty_list() {
        let nodes = endpoints(&["10.0.0.1"]);
        let registry = NodeRegistry::new(nodes.clone()).unwrap();

        assert!(!registry.replace(Vec::new()));
        assert_eq!(registry.snapshot(), nodes);
    }

    #[test]
    fn refresh_is_single_flight() {
        let registry = NodeRegistry::new(endpoints(&["10.0.0.1"])).unwrap();
        let now = Instant::now();

        assert!(registry.refresh_may_be_due(now));
        assert!(registry.try_begin_refresh(now, true));
        assert!(registry.is_refreshing());
        assert!(!registry.refresh_may_be_due(now));
        assert!(!registry.try_begin_refresh(now, true));
        assert!(!registry.try_begin_refresh(now, false));

        registry.finish_refresh(now + Duration::from_secs(10));
        assert!(!registry.is_refreshing());
    }

    #[test]
    fn refresh_respects_next_eligible_time() {
        let registry = NodeRegistry::new(endpoints(&["10.0.0.1"])).unwrap();
        let now = Instant::now();

        assert!(registry.try_begin_refresh(now, true));
        registry.finish_refresh(now + Duration::from_secs(10));

        assert!(!registry.try_begin_refresh(now + Duration::from_secs(5), true));
        assert!(registry.try_begin_refresh(now + Duration::from_secs(5), false));
        registry.finish_refresh(now + Duration::from_secs(10));
        assert!(registry.try_begin_refresh(now + Duration::from_secs(10), true));
    }

    #[test]
    fn pre_check_honors_next_eligible_time() {
        let registry = NodeRegistry::new(endpoints(&["10.0.0.1"])).unwrap();
        let now = Instant::now();

        assert!(registry.try_begin_refresh(now, true));
        registry.finish_refresh(now + Duration::from_secs(3600));

        assert!(!registry.is_refreshing());
        assert!(!registry.refresh_may_be_due(now));
        assert!(!registry.refresh_may_be_due(now + Duration::from_secs(1800)));
        assert!(registry.refresh_may_be_due(now + Duration::from_secs(3600)));
    }

    #[test]
    fn concurrent_next_never_sees_empty_list() {
        let first = endpoints(&["10.0.0.1", "10.0.0.2"]);
        let second = endpoints(&["10.0.0.3", "10.0.0.4", "10.0.0.5"]);
        let valid: HashSet<Endpoint> = first.iter().chain(second.iter()).copied().collect();
        let registry = Arc::new(NodeRegistry::new(first.clone()).unwrap());

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || (0..1000).map(|_| registry.next()).collect::<Vec<_>>())
            })
            .collect();

        let swapper = {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let next = if i % 2 == 0 { second.clone() } else { first.clone() };
                    registry.replace(next);
                    registry.replace(Vec::new());
                }
            })
        };

        swapper.join().unwrap();
        for caller in callers {
            for node in caller.join().unwrap() {
                assert!(valid.contains(&node));
            }
        }
        assert!(!registry.snapshot().is_empty());
    }

    #[test]
    fn concurrent_next_hands_out_distinct_positions() {
        let nodes = endpoints(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]);
        let registry = Arc::new(NodeRegistry::new(nodes.clone()).unwrap());

        let callers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || (0..250).map(|_| registry.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for caller in callers {
            for node in caller.join().unwrap() {
                *counts.entry(node).or_insert(0) += 1;
            }
        }

        // 1000 picks over 4 nodes with a shared counter: perfectly even.
        for node in &nodes {
            assert_eq!(counts[node], 250);
        }
    }
}
