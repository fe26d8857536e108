//! Leader detection across nodes that may disagree or be unreachable.

use std::sync::Arc;

use tracing::debug;

use shakedown_common::{HarnessError, Result};

use crate::node::ClusterNode;

/// Returns the one node that believes itself the cluster leader.
///
/// Nodes are queried sequentially; the set is small and correctness does not
/// depend on concurrency here. Zero claimants is a `NotFound` error, more
/// than one simultaneous claimant is a `BadState` error. A double claim can
/// be a legitimately reachable transient during an election, so callers
/// polling for a leader should retry around either error rather than treat
/// it as fatal.
pub async fn leader_node(nodes: &[Arc<dyn ClusterNode>]) -> Result<Arc<dyn ClusterNode>> {
    let mut leader: Option<Arc<dyn ClusterNode>> = None;
    for node in nodes {
        if node.is_leader().await {
            debug!(node = node.private_addr(), "node claims leadership");
            if let Some(existing) = &leader {
                return Err(HarnessError::BadState(format!(
                    "multiple leader nodes [{}, {}]",
                    existing.private_addr(),
                    node.private_addr()
                )));
            }
            leader = Some(node.clone());
        }
    }
    leader.ok_or_else(|| HarnessError::NotFound("no node claims cluster leadership".to_string()))
}
