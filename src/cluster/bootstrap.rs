//! Cluster wiring and whole-system solves

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::cluster::node::Node;
use crate::core::config::ClusterConfig;
use crate::core::errors::{ClusterError, Result};
use crate::datastore::{Datastore, MemoryDatastore};
use crate::system::LinearSystem;

/// A fully wired set of nodes, one per datastore
#[derive(Debug)]
pub struct Cluster {
    nodes: Vec<Arc<Node>>,
    config: Arc<ClusterConfig>,
}

impl Cluster {
    /// Create one node per datastore, attach storage, then introduce the peers
    pub fn new(datastores: Vec<Arc<dyn Datastore>>, config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let size = datastores.len();
        if size == 0 {
            return Err(ClusterError::configuration("a cluster needs at least one node"));
        }
        let config = Arc::new(config);

        let nodes = (0..size)
            .map(|id| Node::with_config(id, size, config.clone()).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        for (node, datastore) in nodes.iter().zip(datastores) {
            node.attach_datastore(datastore)?;
        }
        for node in &nodes {
            node.attach_peers(&nodes)?;
        }

        info!(size, "Cluster wired");
        Ok(Self { nodes, config })
    }

    /// Partition `system` into in-memory datastores and wire a cluster over them
    pub fn in_memory(system: &LinearSystem, config: ClusterConfig) -> Result<(Self, Vec<Arc<MemoryDatastore>>)> {
        let stores = MemoryDatastore::for_system(system, &config);
        let datastores = stores
            .iter()
            .map(|store| store.clone() as Arc<dyn Datastore>)
            .collect();
        Ok((Self::new(datastores, config)?, stores))
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Run `solve` on every node concurrently and assemble x.
    ///
    /// The first failing node ends the solve; the remaining nodes are aborted
    /// rather than left blocked on a peer that will never arrive.
    #[instrument(skip(self), fields(run_id = %Uuid::new_v4(), size = self.nodes.len()))]
    pub async fn solve(&self) -> Result<Vec<f64>> {
        let mut solves = JoinSet::new();
        for node in &self.nodes {
            let node = Arc::clone(node);
            solves.spawn(async move { node.solve().await });
        }

        let mut x = vec![0.0; self.nodes.len()];
        while let Some(joined) = solves.join_next().await {
            let (value, index) = joined
                .map_err(|e| ClusterError::concurrency_with_source("node_solve_join", e))?
                .map_err(|e| {
                    error!(category = e.category(), error = %e, "Node solve failed");
                    e
                })?;
            x[index] = value;
        }

        info!("Solve complete");
        Ok(x)
    }

    /// Shut every node down, waiting for outstanding remote reads
    pub async fn shutdown(&self) -> Result<()> {
        futures::future::try_join_all(self.nodes.iter().map(|node| node.shutdown())).await?;
        info!(size = self.nodes.len(), "Cluster shut down");
        Ok(())
    }
}
