//! Per-node worker: triangularization followed by back-substitution

use std::sync::Arc;
use tracing::{debug, error};

use crate::cluster::barrier::ReentrantBarrier;
use crate::cluster::node::Node;
use crate::cluster::remote::RemoteOp;
use crate::core::errors::{ClusterError, Result, Stage};
use crate::datastore::{Datastore, NodeId, TaskKind};
use crate::system::checked_div;

pub struct ComputeTask {
    node: Arc<Node>,
    datastore: Arc<dyn Datastore>,
    barrier: Arc<ReentrantBarrier>,
    size: usize,
    pivot_tolerance: f64,
}

impl ComputeTask {
    /// Fails fast if the node has not been fully wired
    pub fn new(node: Arc<Node>) -> Result<Self> {
        let datastore = node.datastore()?;
        let barrier = node.barrier()?;
        let size = node.matrix_size();
        let pivot_tolerance = node.config().pivot_tolerance;
        Ok(Self {
            node,
            datastore,
            barrier,
            size,
            pivot_tolerance,
        })
    }

    fn id(&self) -> NodeId {
        self.node.id()
    }

    pub async fn run(self) -> Result<f64> {
        self.datastore.register(self.id(), TaskKind::Compute);
        self.triangularize().await?;
        self.back_substitute().await
    }

    async fn triangularize(&self) -> Result<()> {
        for iteration in 0..self.size - 1 {
            // The pivot row must be fully reduced before anyone reads it
            self.barrier.wait().await?;
            self.node.metrics().record_barrier_round();

            if self.id() > iteration {
                self.eliminate(iteration).await?;
            }
        }
        debug!(node = self.id(), "Triangularization finished");
        Ok(())
    }

    /// Subtract `multiplier` times the pivot row from this node's row
    async fn eliminate(&self, iteration: usize) -> Result<()> {
        let id = self.id();

        let pivot = self
            .node
            .remote_read(iteration, RemoteOp::RowEntry { column: iteration })
            .await?;
        let leading = self.datastore.read_row_entry(id, iteration).await?;
        let multiplier = self.divide(leading, pivot, Stage::Triangularization, iteration)?;
        // Kept in place of the eliminated zero
        self.datastore.write_row_entry(id, iteration, multiplier).await?;

        for column in iteration + 1..self.size {
            let upper = self.node.remote_read(iteration, RemoteOp::RowEntry { column }).await?;
            let local = self.datastore.read_row_entry(id, column).await?;
            self.datastore
                .write_row_entry(id, column, local - multiplier * upper)
                .await?;
        }

        let upper = self.node.remote_read(iteration, RemoteOp::VectorEntry).await?;
        let local = self.datastore.read_vector_entry(id).await?;
        self.datastore
            .write_vector_entry(id, local - multiplier * upper)
            .await?;

        debug!(node = id, iteration, multiplier, "Row eliminated");
        Ok(())
    }

    /// Solve x[id..] from the triangular rows, one node at a time from the bottom up
    async fn back_substitute(&self) -> Result<f64> {
        let id = self.id();
        if id + 1 < self.size {
            self.node.peer(id + 1)?.consume_completion().await?;
        }
        self.node.metrics().mark_back_substitution_started().await;

        let mut x = vec![0.0; self.size];
        for k in (id..self.size).rev() {
            let rhs = self.node.remote_read(k, RemoteOp::VectorEntry).await?;
            let diagonal = self.node.remote_read(k, RemoteOp::RowEntry { column: k }).await?;

            let mut sum = 0.0;
            for j in k + 1..self.size {
                let coefficient = self.node.remote_read(k, RemoteOp::RowEntry { column: j }).await?;
                sum += coefficient * x[j];
            }
            x[k] = self.divide(rhs - sum, diagonal, Stage::BackSubstitution, k)?;
        }

        self.node.metrics().mark_back_substitution_finished().await;
        if id > 0 {
            self.node.raise_completion();
        }
        debug!(node = id, value = x[id], "Back-substitution finished");
        Ok(x[id])
    }

    fn divide(&self, numerator: f64, divisor: f64, stage: Stage, iteration: usize) -> Result<f64> {
        checked_div(numerator, divisor, self.pivot_tolerance).ok_or_else(|| {
            error!(node = self.id(), %stage, iteration, divisor, "Zero pivot");
            ClusterError::arithmetic(self.id(), stage, iteration, divisor)
        })
    }
}
