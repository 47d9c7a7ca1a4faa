//! Simulated compute cluster
//!
//! Nodes share a process but only talk through the barrier, per-node inbound
//! semaphores, one-shot reply channels and the back-substitution hand-off
//! tokens.

pub mod barrier;
pub mod bootstrap;
pub mod compute;
pub mod metrics;
pub mod node;
pub mod remote;

pub use barrier::ReentrantBarrier;
pub use bootstrap::Cluster;
pub use compute::ComputeTask;
pub use metrics::{NodeMetrics, NodeMetricsSnapshot};
pub use node::Node;
pub use remote::{RemoteAccessTask, RemoteOp};
