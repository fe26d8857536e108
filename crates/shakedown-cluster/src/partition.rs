//! Two-way network partition around a designated node.
//!
//! Isolation installs a reciprocal pair of traffic-drop rules on the target
//! for every other cluster member, so the target becomes unreachable from
//! and to the rest of the cluster while its own control plane keeps running
//! locally. Healing removes the same rules. The controller is not reentrant
//! per cluster; callers serialize through the orchestrator's linear flow.

use std::sync::Arc;

use tracing::info;

use shakedown_common::Result;

use crate::node::ClusterNode;

/// A two-way split of the cluster: `isolated` always contains exactly the
/// target node, `remainder` everything else. The subsets are disjoint and
/// their union is the original cluster. Exists only for the duration of an
/// isolation window.
pub struct Partition {
    pub isolated: Vec<Arc<dyn ClusterNode>>,
    pub remainder: Vec<Arc<dyn ClusterNode>>,
}

/// Computes the partition membership without touching the network.
pub fn split(cluster: &[Arc<dyn ClusterNode>], target: &Arc<dyn ClusterNode>) -> Partition {
    let remainder = cluster
        .iter()
        .filter(|node| node.private_addr() != target.private_addr())
        .cloned()
        .collect();
    Partition {
        isolated: vec![target.clone()],
        remainder,
    }
}

/// Isolates `target` from every other member of `cluster`.
///
/// Rules are installed peer by peer and the call only returns once every
/// pair is in place: a partially applied partition could let the old leader
/// retain quorum and produce a false test failure, so any rule-install error
/// aborts immediately and is propagated with the rule and peer implicated.
pub async fn isolate(
    target: &Arc<dyn ClusterNode>,
    cluster: &[Arc<dyn ClusterNode>],
) -> Result<Partition> {
    for peer in cluster {
        if peer.private_addr() == target.private_addr() {
            continue;
        }
        target.block_peer(peer.private_addr()).await?;
        info!(
            node = target.private_addr(),
            peer = peer.private_addr(),
            "dropping traffic to and from peer"
        );
    }
    Ok(split(cluster, target))
}

/// Removes the partition rules installed by [`isolate`] for the same target
/// and cluster.
///
/// Removal of a rule that does not exist (possible if isolation partially
/// failed) surfaces as a distinguishable error rather than being swallowed.
pub async fn heal(target: &Arc<dyn ClusterNode>, cluster: &[Arc<dyn ClusterNode>]) -> Result<()> {
    for peer in cluster {
        if peer.private_addr() == target.private_addr() {
            continue;
        }
        target.unblock_peer(peer.private_addr()).await?;
        info!(
            node = target.private_addr(),
            peer = peer.private_addr(),
            "accepting traffic to and from peer"
        );
    }
    Ok(())
}

/// Private addresses of a node list, for logging partition membership.
pub fn addrs(nodes: &[Arc<dyn ClusterNode>]) -> Vec<&str> {
    nodes.iter().map(|node| node.private_addr()).collect()
}
