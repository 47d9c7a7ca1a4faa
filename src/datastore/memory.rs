use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::core::config::ClusterConfig;
use crate::core::errors::{ClusterError, Result};
use crate::datastore::{Datastore, NodeId, TaskKind};
use crate::system::LinearSystem;

/// In-memory datastore holding one row of A and one entry of b
#[derive(Debug)]
pub struct MemoryDatastore {
    owner: NodeId,
    row: RwLock<Vec<f64>>,
    rhs: RwLock<f64>,
    max_pending_requests: usize,
    read_latency: Duration,
    registrations: DashMap<TaskKind, u64>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryDatastore {
    pub fn new(owner: NodeId, row: Vec<f64>, rhs: f64) -> Self {
        Self {
            owner,
            row: RwLock::new(row),
            rhs: RwLock::new(rhs),
            max_pending_requests: 0,
            read_latency: Duration::ZERO,
            registrations: DashMap::new(),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn with_max_pending_requests(mut self, bound: usize) -> Self {
        self.max_pending_requests = bound;
        self
    }

    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// Split a system into one datastore per row
    pub fn for_system(system: &LinearSystem, config: &ClusterConfig) -> Vec<Arc<Self>> {
        system
            .matrix()
            .iter()
            .zip(system.rhs())
            .enumerate()
            .map(|(owner, (row, rhs))| {
                Arc::new(
                    Self::new(owner, row.clone(), *rhs)
                        .with_max_pending_requests(config.max_pending_requests)
                        .with_read_latency(config.read_latency),
                )
            })
            .collect()
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// Current contents of the owned row
    pub async fn row(&self) -> Vec<f64> {
        self.row.read().await.clone()
    }

    /// Current value of the owned vector entry
    pub async fn rhs(&self) -> f64 {
        *self.rhs.read().await
    }

    /// Number of times a task of `kind` registered with this datastore
    pub fn registrations(&self, kind: TaskKind) -> u64 {
        self.registrations.get(&kind).map(|count| *count).unwrap_or(0)
    }

    /// Total registrations across all task kinds
    pub fn total_registrations(&self) -> u64 {
        self.registrations.iter().map(|entry| *entry.value()).sum()
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn check_owner(&self, node: NodeId, operation: &str) -> Result<()> {
        if node != self.owner {
            warn!(owner = self.owner, node, operation, "Access on behalf of foreign node");
            return Err(ClusterError::datastore(
                node,
                operation,
                format!("datastore belongs to node {}", self.owner),
            ));
        }
        Ok(())
    }

    fn check_column(&self, row: &[f64], node: NodeId, column: usize, operation: &str) -> Result<()> {
        if column >= row.len() {
            return Err(ClusterError::datastore(
                node,
                operation,
                format!("column {} out of range for row of length {}", column, row.len()),
            ));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        if !self.read_latency.is_zero() {
            tokio::time::sleep(self.read_latency).await;
        }
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    fn max_pending_requests(&self) -> usize {
        self.max_pending_requests
    }

    fn register(&self, node: NodeId, task: TaskKind) {
        debug!(owner = self.owner, node, ?task, "Task registered");
        *self.registrations.entry(task).or_insert(0) += 1;
    }

    async fn read_row_entry(&self, node: NodeId, column: usize) -> Result<f64> {
        self.check_owner(node, "read_row_entry")?;
        self.simulate_latency().await;
        let row = self.row.read().await;
        self.check_column(&row, node, column, "read_row_entry")?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(row[column])
    }

    async fn write_row_entry(&self, node: NodeId, column: usize, value: f64) -> Result<()> {
        self.check_owner(node, "write_row_entry")?;
        let mut row = self.row.write().await;
        self.check_column(&row, node, column, "write_row_entry")?;
        row[column] = value;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn read_vector_entry(&self, node: NodeId) -> Result<f64> {
        self.check_owner(node, "read_vector_entry")?;
        self.simulate_latency().await;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(*self.rhs.read().await)
    }

    async fn write_vector_entry(&self, node: NodeId, value: f64) -> Result<()> {
        self.check_owner(node, "write_vector_entry")?;
        *self.rhs.write().await = value;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
