#![deny(missing_docs)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Client-side node discovery and load balancing for
//! [Scylla Alternator](https://docs.scylladb.com/manual/stable/alternator/alternator.html)
//! clusters.
//!
//! Alternator exposes the DynamoDB API on every node but ships no server-side
//! load balancer. Each node can, however, list its live peers through the
//! `/localnodes` query. This crate keeps a live node list fresh in the
//! background and hands out nodes in round-robin order, so that one logical
//! client spreads its requests across the whole cluster.
//!
//! # Features
//!
//! - **Lock-light selection**: [`LoadBalancer::next`] never touches the network
//! - **Background refresh**: at most one `/localnodes` query in flight per load
//!   balancer, run on a single worker thread shared by the whole process
//! - **Rack/datacenter awareness**: restrict traffic to a topology subset and
//!   verify that the cluster honors the restriction
//! - **Connection reuse**: one HTTP connection pool per node
//!
//! # Usage
//!
//! ```ignore
//! use std::time::Duration;
//! use alternator_lb::{Config, LoadBalancer};
//!
//! let config = Config::new(["10.0.0.1", "10.0.0.2"])
//!     .port(8000)
//!     .rack("rack1")
//!     .update_interval(Duration::from_secs(10));
//!
//! let lb = LoadBalancer::new(config)?;
//! lb.start().await?;
//! lb.validate_filter_correctness().await?;
//!
//! // Feed the next node into your DynamoDB client's endpoint resolution
//! let endpoint = lb.next();
//! ```

mod balancer;
mod config;
mod discovery;
mod endpoint;
mod error;
mod pool;
mod probe;
mod refresh;
mod registry;
#[cfg(test)]
mod testing;
mod worker;

pub use balancer::{EndpointResolver, LoadBalancer};
pub use config::{ClientIdentity, Config, DEFAULT_PORT, DEFAULT_UPDATE_INTERVAL};
pub use discovery::{Discover, DiscoveryClient, Filter, FilterKind, LOCAL_NODES_PATH};
pub use endpoint::{Endpoint, Scheme};
pub use error::{Error, Result};
pub use pool::{ConnectionPool, ConnectionPoolCache};
pub use probe::FeatureProbe;
pub use refresh::RefreshCoordinator;
pub use registry::NodeRegistry;
pub use worker::WorkerPool;
