//! Cluster status document model and fan-out status queries.
//!
//! The status document is consumed, not produced, by the harness: each node
//! reports its own local view of the cluster. The harness only reads the
//! aggregate state and the per-node address list; everything else is carried
//! for diagnostics.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use shakedown_common::{HarnessError, Result};

use crate::node::ClusterNode;

/// Top-level status document as returned by a node's status query.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusReport {
    pub cluster: ClusterStatus,
}

/// One node's view of the cluster.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterStatus {
    /// The application deployed on the cluster.
    pub application: Application,
    /// Cluster name; `domain` on the wire.
    #[serde(rename = "domain")]
    pub cluster: String,
    /// Aggregate cluster state; `state` on the wire.
    #[serde(rename = "state")]
    pub state: ClusterState,
    /// Join token guarding cluster membership.
    pub token: JoinToken,
    /// The cluster members as this node currently perceives them.
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

impl ClusterStatus {
    /// Convergence predicate: two snapshots are in sync iff their aggregate
    /// states are equal. This is what the orchestrator checks after healing
    /// a partition.
    pub fn in_sync(&self, other: &ClusterStatus) -> bool {
        self.state == other.state
    }
}

/// Aggregate cluster state. The wire value is a lowercase string; anything
/// outside the known set maps to `Unknown` rather than failing the parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    /// Healthy and serving.
    Active,
    /// Functional but impaired.
    Degraded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Application {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JoinToken {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeEntry {
    /// Cluster-internal advertised address of the member.
    #[serde(rename = "advertise_ip")]
    pub addr: String,
}

/// Queries status on every node concurrently and returns all snapshots.
///
/// Errors are collected across the whole fan-out before returning: if any
/// node fails to answer, the aggregate error names every failing node. A
/// single query failure does not by itself imply a partition; callers decide
/// whether to retry.
pub async fn cluster_status(nodes: &[Arc<dyn ClusterNode>]) -> Result<Vec<ClusterStatus>> {
    let queries = nodes.iter().map(|node| {
        let node = node.clone();
        async move {
            let result = node.status().await;
            (node.private_addr().to_string(), result)
        }
    });
    let results = join_all(queries).await;

    let mut statuses = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (addr, result) in results {
        match result {
            Ok(status) => statuses.push(status),
            Err(err) => failures.push(format!("{addr}: {err}")),
        }
    }
    if !failures.is_empty() {
        return Err(HarnessError::BadState(format!(
            "status query failed on {} of {} nodes: {}",
            failures.len(),
            nodes.len(),
            failures.join("; ")
        )));
    }
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "cluster": {
            "application": {"name": "wordpress"},
            "domain": "testcluster",
            "state": "active",
            "token": {"token": "s3cret"},
            "nodes": [
                {"advertise_ip": "10.1.1.1"},
                {"advertise_ip": "10.1.1.2"}
            ]
        }
    }"#;

    #[test]
    fn parses_a_status_document() {
        let report: StatusReport = serde_json::from_str(SAMPLE).unwrap();
        let status = report.cluster;
        assert_eq!(status.application.name, "wordpress");
        assert_eq!(status.cluster, "testcluster");
        assert_eq!(status.state, ClusterState::Active);
        assert_eq!(status.token.token, "s3cret");
        let addrs: Vec<_> = status.nodes.iter().map(|n| n.addr.as_str()).collect();
        assert_eq!(addrs, ["10.1.1.1", "10.1.1.2"]);
    }

    #[test]
    fn unrecognized_state_maps_to_unknown() {
        let doc = SAMPLE.replace("\"active\"", "\"provisioning\"");
        let report: StatusReport = serde_json::from_str(&doc).unwrap();
        assert_eq!(report.cluster.state, ClusterState::Unknown);
    }

    #[test]
    fn in_sync_compares_aggregate_state_only() {
        let a: StatusReport = serde_json::from_str(SAMPLE).unwrap();
        let mut b: StatusReport = serde_json::from_str(SAMPLE).unwrap();
        assert!(a.cluster.in_sync(&b.cluster));

        b.cluster.state = ClusterState::Degraded;
        assert!(!a.cluster.in_sync(&b.cluster));

        // Differences outside the state do not break sync.
        b.cluster.state = ClusterState::Active;
        b.cluster.nodes.pop();
        assert!(a.cluster.in_sync(&b.cluster));
    }
}
