//! Distributed Gaussian elimination over simulated compute nodes.
//!
//! Each [`Node`] owns one row of A and one entry of b inside its
//! [`Datastore`]. Nodes never read each other's storage directly: remote
//! values travel through short-lived [`RemoteAccessTask`]s bounded by the
//! target's inbound semaphore. Elimination rounds are separated by a shared
//! [`ReentrantBarrier`], and back-substitution is serialized from the highest
//! node id down by a chain of completion tokens.

// Core infrastructure
pub mod core;

pub mod cluster;
pub mod datastore;
pub mod system;

pub use crate::core::config::{ClusterConfig, ClusterConfigBuilder};
pub use crate::core::errors::{ClusterError, Result, Stage};
pub use cluster::{Cluster, ComputeTask, Node, NodeMetrics, NodeMetricsSnapshot, ReentrantBarrier, RemoteAccessTask, RemoteOp};
pub use datastore::{Datastore, MemoryDatastore, NodeId, TaskKind};
pub use system::{LinearSystem, SystemFile};
