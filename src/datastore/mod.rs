//! Per-node storage contract
//!
//! Every node owns exactly one row of A and one entry of b, kept in a
//! [`Datastore`]. The cluster logic never touches another node's storage
//! directly; it reaches it through a remote-access task running against the
//! target node, which calls into the target's datastore.

use async_trait::async_trait;

use crate::core::errors::Result;

pub mod memory;

pub use memory::MemoryDatastore;

/// Node identity, also the row index it owns
pub type NodeId = usize;

/// Kinds of tasks that announce themselves to a datastore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// The node's own triangularization/back-substitution worker
    Compute,
    /// A one-shot read on behalf of `caller`
    RemoteAccess { caller: NodeId },
}

/// Storage trait for one node's row and vector entry
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Maximum concurrent inbound reads (0 = matrix size)
    fn max_pending_requests(&self) -> usize;

    /// Lifecycle hook called by every task before it touches this datastore
    fn register(&self, node: NodeId, task: TaskKind);

    /// Read A[node][column]
    async fn read_row_entry(&self, node: NodeId, column: usize) -> Result<f64>;

    /// Overwrite A[node][column]
    async fn write_row_entry(&self, node: NodeId, column: usize, value: f64) -> Result<()>;

    /// Read b[node]
    async fn read_vector_entry(&self, node: NodeId) -> Result<f64>;

    /// Overwrite b[node]
    async fn write_vector_entry(&self, node: NodeId, value: f64) -> Result<()>;
}
