use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

use crate::cluster::barrier::ReentrantBarrier;
use crate::cluster::compute::ComputeTask;
use crate::cluster::metrics::NodeMetrics;
use crate::cluster::remote::{RemoteAccessTask, RemoteOp};
use crate::core::config::ClusterConfig;
use crate::core::errors::{ClusterError, Result};
use crate::datastore::{Datastore, NodeId};

/// Storage side of a node, fixed once attached
struct Attachment {
    datastore: Arc<dyn Datastore>,
    /// Gates concurrent reads other nodes make against this node
    inbound: Semaphore,
    max_requests: usize,
}

/// One simulated compute node owning row `id` of the system
pub struct Node {
    id: NodeId,
    matrix_size: usize,
    config: Arc<ClusterConfig>,
    attachment: OnceLock<Attachment>,
    peers: OnceLock<Vec<Weak<Node>>>,
    barrier: OnceLock<Arc<ReentrantBarrier>>,
    /// Back-substitution hand-off token raised for node `id - 1`
    completion: Semaphore,
    remote_tasks: Mutex<JoinSet<()>>,
    metrics: NodeMetrics,
}

impl Node {
    pub fn new(id: NodeId, matrix_size: usize) -> Result<Self> {
        Self::with_config(id, matrix_size, Arc::new(ClusterConfig::default()))
    }

    pub fn with_config(id: NodeId, matrix_size: usize, config: Arc<ClusterConfig>) -> Result<Self> {
        if id >= matrix_size {
            return Err(ClusterError::configuration_field(
                format!("node id {} outside [0, {})", id, matrix_size),
                "id",
            ));
        }
        Ok(Self {
            id,
            matrix_size,
            config,
            attachment: OnceLock::new(),
            peers: OnceLock::new(),
            barrier: OnceLock::new(),
            completion: Semaphore::new(0),
            remote_tasks: Mutex::new(JoinSet::new()),
            metrics: NodeMetrics::new(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn matrix_size(&self) -> usize {
        self.matrix_size
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    /// Inbound read bound, available once a datastore is attached
    pub fn max_requests(&self) -> Option<usize> {
        self.attachment.get().map(|attachment| attachment.max_requests)
    }

    /// Give the node its storage. A reported bound of 0 means "matrix size".
    pub fn attach_datastore(&self, datastore: Arc<dyn Datastore>) -> Result<()> {
        let max_requests = match datastore.max_pending_requests() {
            0 => self.matrix_size,
            bound => bound,
        };
        self.attachment
            .set(Attachment {
                datastore,
                inbound: Semaphore::new(max_requests),
                max_requests,
            })
            .map_err(|_| ClusterError::configuration(format!("{} already has a datastore", self)))?;
        debug!(node = self.id, max_requests, "Datastore attached");
        Ok(())
    }

    /// Introduce every node of the cluster, this one included, indexed by id.
    /// The barrier is owned by node 0 and shared by all.
    pub fn attach_peers(&self, peers: &[Arc<Node>]) -> Result<()> {
        if peers.len() != self.matrix_size {
            return Err(ClusterError::configuration_field(
                format!("expected {} peers, got {}", self.matrix_size, peers.len()),
                "peers",
            ));
        }
        if let Some((index, peer)) = peers
            .iter()
            .enumerate()
            .find(|(index, peer)| peer.id != *index || peer.matrix_size != self.matrix_size)
        {
            return Err(ClusterError::configuration_field(
                format!("peer slot {} holds {} of a size-{} cluster", index, peer, peer.matrix_size),
                "peers",
            ));
        }
        if !std::ptr::eq(Arc::as_ptr(&peers[self.id]), self) {
            return Err(ClusterError::configuration_field(
                format!("peer slot {} does not hold this node", self.id),
                "peers",
            ));
        }

        self.peers
            .set(peers.iter().map(Arc::downgrade).collect())
            .map_err(|_| ClusterError::configuration(format!("{} already has peers", self)))?;

        let fresh = ReentrantBarrier::new(self.matrix_size)?;
        let shared = peers[0].barrier.get_or_init(|| Arc::new(fresh)).clone();
        self.barrier.get_or_init(|| shared);
        debug!(node = self.id, peers = peers.len(), "Peers attached");
        Ok(())
    }

    pub(crate) fn datastore(&self) -> Result<Arc<dyn Datastore>> {
        self.attachment
            .get()
            .map(|attachment| attachment.datastore.clone())
            .ok_or_else(|| ClusterError::configuration(format!("{} has no datastore attached", self)))
    }

    pub(crate) fn barrier(&self) -> Result<Arc<ReentrantBarrier>> {
        self.barrier
            .get()
            .cloned()
            .ok_or_else(|| ClusterError::configuration(format!("{} has no peers attached", self)))
    }

    pub(crate) fn peer(&self, id: NodeId) -> Result<Arc<Node>> {
        let peers = self
            .peers
            .get()
            .ok_or_else(|| ClusterError::configuration(format!("{} has no peers attached", self)))?;
        peers
            .get(id)
            .and_then(Weak::upgrade)
            .ok_or_else(|| ClusterError::configuration(format!("peer {} is not available to {}", id, self)))
    }

    fn inbound(&self) -> Result<&Semaphore> {
        self.attachment
            .get()
            .map(|attachment| &attachment.inbound)
            .ok_or_else(|| ClusterError::configuration(format!("{} has no datastore attached", self)))
    }

    /// Compute this node's unknown. Blocks until the whole cluster has
    /// triangularized and every higher node has finished back-substitution.
    #[instrument(skip(self), fields(node = self.id))]
    pub async fn solve(self: &Arc<Self>) -> Result<(f64, NodeId)> {
        let task = ComputeTask::new(Arc::clone(self))?;

        // Dropping the set aborts the worker if this call is cancelled
        let mut worker = JoinSet::new();
        worker.spawn(task.run());
        let joined = worker
            .join_next()
            .await
            .ok_or_else(|| ClusterError::task(self.id, "compute task was never scheduled"))?;
        let value = joined.map_err(|e| ClusterError::task(self.id, e.to_string()))??;

        info!(value, "Unknown solved");
        Ok((value, self.id))
    }

    /// Wait for every remote-access task this node spawned to finish
    pub async fn shutdown(&self) -> Result<()> {
        let mut tasks = self.remote_tasks.lock().await;
        let mut joined = 0usize;
        while let Some(result) = tasks.join_next().await {
            result.map_err(|e| ClusterError::concurrency_with_source("remote_access_join", e))?;
            joined += 1;
        }
        info!(node = self.id, joined, "Node shut down");
        Ok(())
    }

    /// Fetch one scalar from `target`'s datastore through a remote-access task.
    ///
    /// The target's inbound permit is held until the reply has been consumed,
    /// so no more than `max_requests` reads are ever outstanding against it.
    pub(crate) async fn remote_read(&self, target: NodeId, op: RemoteOp) -> Result<f64> {
        let peer = self.peer(target)?;
        let permit = peer.inbound()?.acquire().await?;

        let (reply, response) = oneshot::channel();
        self.metrics.record_remote_read_issued();
        {
            let mut tasks = self.remote_tasks.lock().await;
            // Reap finished reads so the set only holds in-flight ones
            while tasks.try_join_next().is_some() {}
            tasks.spawn(RemoteAccessTask::new(self.id, Arc::clone(&peer), op, reply).run());
        }

        let value = response.await??;
        drop(permit);
        Ok(value)
    }

    /// Remote-access task handles still held by this node
    pub(crate) async fn retained_remote_tasks(&self) -> usize {
        self.remote_tasks.lock().await.len()
    }

    pub(crate) fn raise_completion(&self) {
        self.completion.add_permits(1);
    }

    /// Consume the token raised by this node once it finished back-substitution
    pub(crate) async fn consume_completion(&self) -> Result<()> {
        self.completion.acquire().await?.forget();
        Ok(())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node {}", self.id)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("matrix_size", &self.matrix_size)
            .field("max_requests", &self.max_requests())
            .field("peers_attached", &self.peers.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::MemoryDatastore;

    fn wired(size: usize) -> Vec<Arc<Node>> {
        let nodes: Vec<Arc<Node>> = (0..size).map(|id| Arc::new(Node::new(id, size).unwrap())).collect();
        for node in &nodes {
            let store = MemoryDatastore::new(node.id(), vec![1.0; size], 1.0);
            node.attach_datastore(Arc::new(store)).unwrap();
        }
        for node in &nodes {
            node.attach_peers(&nodes).unwrap();
        }
        nodes
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_finished_remote_tasks_are_reaped() {
        let system = crate::system::LinearSystem::random_diagonally_dominant(12, 7).unwrap();
        let (cluster, _) = crate::cluster::Cluster::in_memory(&system, ClusterConfig::default()).unwrap();
        cluster.solve().await.unwrap();

        let mut issued = 0;
        for node in cluster.nodes() {
            issued += node.metrics().snapshot().await.remote_reads_issued;
        }
        assert!(issued > 144, "issued {issued}");
        for node in cluster.nodes() {
            let retained = node.retained_remote_tasks().await;
            assert!(retained <= node.matrix_size(), "node {} retained {retained}", node.id());
        }

        cluster.shutdown().await.unwrap();
        for node in cluster.nodes() {
            assert_eq!(node.retained_remote_tasks().await, 0);
        }
    }

    #[test]
    fn test_rejects_id_outside_matrix() {
        let err = Node::new(3, 3).unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_solve_before_attach_fails_fast() {
        let node = Arc::new(Node::new(0, 1).unwrap());
        assert!(node.solve().await.unwrap_err().is_configuration());

        let store = MemoryDatastore::new(0, vec![2.0], 4.0);
        node.attach_datastore(Arc::new(store)).unwrap();
        assert!(node.solve().await.unwrap_err().is_configuration());
    }

    #[test]
    fn test_zero_bound_means_matrix_size() {
        let node = Node::new(1, 4).unwrap();
        let store = MemoryDatastore::new(1, vec![0.0; 4], 0.0);
        node.attach_datastore(Arc::new(store)).unwrap();
        assert_eq!(node.max_requests(), Some(4));

        let other = Node::new(1, 4).unwrap();
        let store = MemoryDatastore::new(1, vec![0.0; 4], 0.0).with_max_pending_requests(2);
        other.attach_datastore(Arc::new(store)).unwrap();
        assert_eq!(other.max_requests(), Some(2));
    }

    #[test]
    fn test_attach_twice_is_rejected() {
        let nodes = wired(2);
        let store = MemoryDatastore::new(0, vec![1.0; 2], 1.0);
        assert!(nodes[0].attach_datastore(Arc::new(store)).is_err());
        assert!(nodes[1].attach_peers(&nodes).is_err());
    }

    #[test]
    fn test_peer_list_must_match_cluster() {
        let nodes = wired(3);
        let stranger = Arc::new(Node::new(0, 2).unwrap());
        assert!(stranger.attach_peers(&nodes[..2]).is_err());

        let shuffled = vec![nodes[1].clone(), nodes[0].clone()];
        let fresh = Arc::new(Node::new(0, 2).unwrap());
        assert!(fresh.attach_peers(&shuffled).is_err());
    }

    #[test]
    fn test_barrier_is_shared() {
        let nodes = wired(4);
        let first = nodes[0].barrier().unwrap();
        for node in &nodes {
            assert!(Arc::ptr_eq(&first, &node.barrier().unwrap()));
        }
        assert_eq!(first.parties(), 4);
    }
}
