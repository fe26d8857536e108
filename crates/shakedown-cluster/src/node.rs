//! The node capability trait and its SSH-backed implementation.
//!
//! A cluster member is simultaneously a command target, a status source, a
//! leadership claimant, and a partition participant. [`ClusterNode`] exposes
//! exactly that capability set; [`SshNode`] is the single concrete type the
//! harness uses against a live cluster. Tests substitute their own
//! implementations.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shakedown_common::command::{self, Command};
use shakedown_common::{HarnessError, Result};

use crate::ssh::SshChannel;
use crate::status::{ClusterStatus, StatusReport};

/// Minimal capability set of one cluster member.
#[async_trait]
pub trait ClusterNode: std::fmt::Debug + Send + Sync {
    /// Address used for cluster-internal communication. Stable for the
    /// node's lifetime within one test run.
    fn private_addr(&self) -> &str;

    /// Address used for harness access.
    fn public_addr(&self) -> &str;

    /// Runs a command on the node and returns its raw output.
    async fn run(&self, command: &Command) -> Result<String>;

    /// Queries and parses the node's local view of cluster status.
    async fn status(&self) -> Result<ClusterStatus>;

    /// Whether this node currently believes itself to be the cluster leader.
    async fn is_leader(&self) -> bool;

    /// Installs the reciprocal pair of traffic-drop rules against one peer:
    /// inbound from the peer and outbound to the peer.
    async fn block_peer(&self, peer_addr: &str) -> Result<()>;

    /// Removes the rule pair installed by [`block_peer`](Self::block_peer).
    /// Removing a rule that does not exist is an error, not a no-op.
    async fn unblock_peer(&self, peer_addr: &str) -> Result<()>;

    /// Launches a long-running operation and returns the command's immediate
    /// output (which embeds the operation identifier).
    async fn launch_operation(&self, command: &Command) -> Result<String>;

    /// Queries the textual status of a previously launched operation.
    async fn operation_status(&self, id: &str) -> Result<String>;
}

/// A live cluster member reached over SSH.
///
/// Commands are issued through the node's [`SshChannel`]; the cluster
/// control binary (`ctl`) is the entry point for status and operation
/// queries on the remote host.
pub struct SshNode {
    private_addr: String,
    public_addr: String,
    channel: SshChannel,
    ctl: String,
}

impl SshNode {
    /// `ctl` is the path of the cluster control binary on the node, e.g.
    /// `/usr/local/bin/clusterctl`.
    pub fn new(
        private_addr: impl Into<String>,
        public_addr: impl Into<String>,
        channel: SshChannel,
        ctl: impl Into<String>,
    ) -> Self {
        Self {
            private_addr: private_addr.into(),
            public_addr: public_addr.into(),
            channel,
            ctl: ctl.into(),
        }
    }

    pub fn channel(&self) -> &SshChannel {
        &self.channel
    }

    /// Powers the node off and marks its channel offline.
    ///
    /// The connection dropping as the host goes down is expected and not
    /// reported as a failure.
    pub async fn power_off(&self, graceful: bool) -> Result<()> {
        let program = if graceful {
            "sudo shutdown -h now"
        } else {
            "sudo poweroff -f"
        };
        match self.channel.run(&Command::new(program)).await {
            Ok(_) | Err(HarnessError::Transport { .. }) => {}
            Err(err) => return Err(err),
        }
        self.channel.mark_offline();
        info!(node = %self.private_addr, graceful, "powered off");
        Ok(())
    }

    /// Reboots the node and waits for it to accept connections again before
    /// reporting success.
    pub async fn reboot(&self, graceful: bool, cancel: &CancellationToken) -> Result<()> {
        let program = if graceful {
            "sudo shutdown -r now"
        } else {
            "sudo reboot -f"
        };
        match self.channel.run(&Command::new(program)).await {
            Ok(_) | Err(HarnessError::Transport { .. }) => {}
            Err(err) => return Err(err),
        }
        info!(node = %self.private_addr, graceful, "rebooting, waiting for host");
        self.channel.wait_ready(cancel).await
    }

    fn rule_error(
        &self,
        direction: &'static str,
        peer: &str,
        err: HarnessError,
    ) -> HarnessError {
        HarnessError::PartitionRule {
            node: self.private_addr.clone(),
            direction,
            peer: peer.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl ClusterNode for SshNode {
    fn private_addr(&self) -> &str {
        &self.private_addr
    }

    fn public_addr(&self) -> &str {
        &self.public_addr
    }

    async fn run(&self, cmd: &Command) -> Result<String> {
        self.channel.run(cmd).await
    }

    async fn status(&self) -> Result<ClusterStatus> {
        let cmd = Command::new(format!("sudo {} status --output=json", self.ctl));
        let output = self.channel.run(&cmd).await?;
        let report: StatusReport =
            command::parse_json(&output).map_err(|source| HarnessError::InvalidStatus {
                node: self.private_addr.clone(),
                source,
            })?;
        Ok(report.cluster)
    }

    async fn is_leader(&self) -> bool {
        // A node determines self-leadership by comparing the coordination
        // layer's leader key (derived from the cluster name) against its own
        // private address.
        let status = match self.status().await {
            Ok(status) => status,
            Err(_) => return false,
        };
        let key = format!("/cluster/{}/leader", status.cluster);
        let cmd = Command::new(format!("sudo etcdctl get {key}"));
        match self.channel.run(&cmd).await {
            Ok(output) => command::parse_trimmed(&output) == self.private_addr,
            Err(err) => {
                warn!(node = %self.private_addr, error = %err, "failed to query leader key");
                false
            }
        }
    }

    async fn block_peer(&self, peer_addr: &str) -> Result<()> {
        let inbound = Command::new(format!("sudo iptables -I INPUT -s {peer_addr} -j DROP"));
        self.channel
            .run(&inbound)
            .await
            .map_err(|err| self.rule_error("inbound", peer_addr, err))?;
        let outbound = Command::new(format!("sudo iptables -I OUTPUT -d {peer_addr} -j DROP"));
        self.channel
            .run(&outbound)
            .await
            .map_err(|err| self.rule_error("outbound", peer_addr, err))?;
        Ok(())
    }

    async fn unblock_peer(&self, peer_addr: &str) -> Result<()> {
        // iptables -D fails when no matching rule exists, e.g. after a
        // partially applied isolation; that failure surfaces as-is.
        let inbound = Command::new(format!("sudo iptables -D INPUT -s {peer_addr} -j DROP"));
        self.channel
            .run(&inbound)
            .await
            .map_err(|err| self.rule_error("inbound", peer_addr, err))?;
        let outbound = Command::new(format!("sudo iptables -D OUTPUT -d {peer_addr} -j DROP"));
        self.channel
            .run(&outbound)
            .await
            .map_err(|err| self.rule_error("outbound", peer_addr, err))?;
        Ok(())
    }

    async fn launch_operation(&self, cmd: &Command) -> Result<String> {
        self.channel.run(cmd).await
    }

    async fn operation_status(&self, id: &str) -> Result<String> {
        let cmd = Command::new(format!(
            "sudo {} status --operation-id={id} --quiet",
            self.ctl
        ));
        self.channel.run(&cmd).await
    }
}

impl std::fmt::Debug for SshNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "node(private_addr={}, public_addr={})",
            self.private_addr, self.public_addr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> SshNode {
        SshNode::new(
            "10.1.1.1",
            "203.0.113.1",
            SshChannel::new("203.0.113.1", "admin"),
            "/usr/local/bin/clusterctl",
        )
    }

    #[test]
    fn debug_shows_both_addresses() {
        assert_eq!(
            format!("{:?}", node()),
            "node(private_addr=10.1.1.1, public_addr=203.0.113.1)"
        );
    }

    #[test]
    fn rule_errors_implicate_the_rule_and_peer() {
        let node = node();
        let err = node.rule_error(
            "outbound",
            "10.1.1.2",
            HarnessError::Transport {
                node: "10.1.1.1".to_string(),
                reason: "connection refused".to_string(),
            },
        );
        match err {
            HarnessError::PartitionRule {
                node,
                direction,
                peer,
                reason,
            } => {
                assert_eq!(node, "10.1.1.1");
                assert_eq!(direction, "outbound");
                assert_eq!(peer, "10.1.1.2");
                assert!(reason.contains("connection refused"));
            }
            other => panic!("expected PartitionRule, got {other}"),
        }
    }

    #[tokio::test]
    async fn commands_against_an_offline_node_fail_fast() {
        let node = node();
        node.channel().mark_offline();
        let err = node.status().await.unwrap_err();
        assert!(matches!(err, HarnessError::Offline { .. }), "got {err}");
    }
}
