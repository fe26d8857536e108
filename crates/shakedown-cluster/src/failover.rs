//! The end-to-end failover scenario.
//!
//! A linear six-stage state machine with no branching on success: find the
//! leader, isolate it, wait for the majority to elect a replacement, verify
//! the partitioned cluster is healthy, heal the partition, and wait for the
//! two former leaders to converge on a single active status. Each stage is
//! gated on the previous one, and every blocking step is bound to the
//! configured status deadline.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use shakedown_common::{with_deadline, Attempt, Result, Retryer};

use crate::leader::leader_node;
use crate::node::ClusterNode;
use crate::partition::{self, addrs};
use crate::status::{cluster_status, ClusterState};

/// Retry budgets and the overall deadline for one failover scenario.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Overall deadline for the scenario's blocking steps.
    pub status: Duration,
    /// Attempt budget for new-leader election polling.
    pub leader_election_retries: u32,
    /// Fixed delay between election polls.
    pub leader_election_delay: Duration,
    /// Attempt budget for post-heal convergence polling. Larger than the
    /// election budget: convergence involves both halves settling.
    pub active_status_retries: u32,
    /// Fixed delay between convergence polls.
    pub active_status_delay: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            status: Duration::from_secs(300),
            leader_election_retries: 30,
            leader_election_delay: Duration::from_secs(10),
            active_status_retries: 60,
            active_status_delay: Duration::from_secs(10),
        }
    }
}

/// Drives the failover scenario against a cluster that already exists.
///
/// The runner owns nothing beyond its configuration; cluster membership is
/// re-derived from the live nodes on every query, and the transient
/// partition lives only for the duration of one scenario.
#[derive(Debug, Clone, Default)]
pub struct FailoverRunner {
    timeouts: Timeouts,
}

impl FailoverRunner {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }

    /// Isolates the current leader, waits for a new one, heals the
    /// partition, and verifies convergence.
    ///
    /// On failure the returned error names the stage that broke. If a stage
    /// after isolation fails or the deadline fires, the partition is left in
    /// place: the failure is the test result, and the installed rules are
    /// evidence for diagnosis.
    pub async fn failover(&self, cluster: &[Arc<dyn ClusterNode>]) -> Result<()> {
        let cancel = Retryer::deadline_token(self.timeouts.status);
        // Releases the deadline sleeper when the scenario returns early.
        let _deadline = cancel.clone().drop_guard();

        // Stage 1: find the current leader; ambiguity here is fatal, the
        // cluster is expected to be settled before the scenario starts.
        let old_leader = with_deadline(&cancel, "leader query", leader_node(cluster))
            .await
            .map_err(|err| err.stage("initial leader not found"))?;
        info!(leader = old_leader.private_addr(), "initial leader node");

        // Stage 2: isolate the leader. Must fully complete before any
        // new-leader polling begins.
        let parts = with_deadline(
            &cancel,
            "partition setup",
            partition::isolate(&old_leader, cluster),
        )
        .await
        .map_err(|err| err.stage("failed to create network partition"))?;
        info!(
            isolated = ?addrs(&parts.isolated),
            remainder = ?addrs(&parts.remainder),
            "created network partition"
        );

        // Stage 3: poll the majority subset until a leader different from
        // the old one appears. Leader-scan errors (nobody claims yet, or a
        // transient double claim mid-election) are keep-waiting.
        let retry = Retryer::new(
            self.timeouts.leader_election_retries,
            self.timeouts.leader_election_delay,
        );
        let majority = parts.remainder.clone();
        let old_addr = old_leader.private_addr().to_string();
        let new_leader = retry
            .run(&cancel, || {
                let majority = majority.clone();
                let old_addr = old_addr.clone();
                async move {
                    match leader_node(&majority).await {
                        Ok(leader) if leader.private_addr() != old_addr => Attempt::Done(leader),
                        Ok(_) | Err(_) => Attempt::retry("new leader not yet elected"),
                    }
                }
            })
            .await
            .map_err(|err| err.stage("new leader was not elected"))?;
        info!(
            old_leader = old_leader.private_addr(),
            new_leader = new_leader.private_addr(),
            "new leader elected"
        );

        // Stage 4: the majority partition must be healthy under the
        // partition. A failure here is itself a meaningful test failure,
        // not a retry condition.
        with_deadline(
            &cancel,
            "partition status query",
            cluster_status(&parts.remainder),
        )
        .await
        .map_err(|err| err.stage("cluster partition is nonoperational"))?;

        // Stage 5: heal. Must fully complete before convergence polling.
        with_deadline(
            &cancel,
            "partition teardown",
            partition::heal(&old_leader, cluster),
        )
        .await
        .map_err(|err| err.stage("failed to remove network partition"))?;
        info!("removed network partition");

        // Stage 6: both former leaders must report status, the states must
        // match, and the matched state must be active. Anything short of
        // that is keep-waiting; only exhausting the budget is final.
        let retry = Retryer::new(
            self.timeouts.active_status_retries,
            self.timeouts.active_status_delay,
        );
        retry
            .run(&cancel, || {
                let old_leader = old_leader.clone();
                let new_leader = new_leader.clone();
                async move {
                    let new_status = match new_leader.status().await {
                        Ok(status) => status,
                        Err(err) => {
                            return Attempt::retry(format!(
                                "status is unavailable on new leader: {err}"
                            ))
                        }
                    };
                    let old_status = match old_leader.status().await {
                        Ok(status) => status,
                        Err(err) => {
                            return Attempt::retry(format!(
                                "status is unavailable on old leader: {err}"
                            ))
                        }
                    };
                    if !new_status.in_sync(&old_status) {
                        warn!(
                            new = ?new_status.state,
                            old = ?old_status.state,
                            "cluster status is not in sync"
                        );
                        return Attempt::retry("cluster status is not in sync");
                    }
                    if new_status.state != ClusterState::Active {
                        warn!(state = ?new_status.state, "cluster status is not active");
                        return Attempt::retry("cluster status is not active");
                    }
                    Attempt::Done(())
                }
            })
            .await
            .map_err(|err| err.stage("cluster did not converge after healing the partition"))?;

        info!("failover complete, cluster converged");
        Ok(())
    }
}
