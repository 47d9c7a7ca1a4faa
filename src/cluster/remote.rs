//! One-shot reads of a single scalar from another node's datastore

use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cluster::node::Node;
use crate::core::errors::Result;
use crate::datastore::{NodeId, TaskKind};

/// What a remote-access task reads from its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    /// A[target][column]
    RowEntry { column: usize },
    /// b[target]
    VectorEntry,
}

/// Reads exactly one value from `target` and delivers it to `caller` exactly once
pub struct RemoteAccessTask {
    caller: NodeId,
    target: Arc<Node>,
    op: RemoteOp,
    reply: oneshot::Sender<Result<f64>>,
}

impl RemoteAccessTask {
    pub(crate) fn new(caller: NodeId, target: Arc<Node>, op: RemoteOp, reply: oneshot::Sender<Result<f64>>) -> Self {
        Self {
            caller,
            target,
            op,
            reply,
        }
    }

    pub async fn run(self) {
        let Self {
            caller,
            target,
            op,
            reply,
        } = self;

        let result = read(caller, &target, op).await;
        if let Err(e) = &result {
            warn!(caller, target = target.id(), ?op, error = %e, "Remote read failed");
        }
        if reply.send(result).is_err() {
            warn!(caller, target = target.id(), ?op, "Caller went away before the reply");
        }
    }
}

async fn read(caller: NodeId, target: &Node, op: RemoteOp) -> Result<f64> {
    let datastore = target.datastore()?;
    datastore.register(target.id(), TaskKind::RemoteAccess { caller });

    let _serving = target.metrics().begin_serving();
    let value = match op {
        RemoteOp::RowEntry { column } => datastore.read_row_entry(target.id(), column).await?,
        RemoteOp::VectorEntry => datastore.read_vector_entry(target.id()).await?,
    };
    debug!(caller, target = target.id(), ?op, value, "Remote read served");
    Ok(value)
}
