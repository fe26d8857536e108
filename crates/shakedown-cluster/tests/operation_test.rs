//! Async operation poller integration tests.
//!
//! A scripted mock node replays a fixed sequence of poll responses so the
//! tests can pin down exactly how many polls happen and which statuses are
//! terminal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use shakedown_cluster::node::ClusterNode;
use shakedown_cluster::operation::{run_operation, PollPolicy};
use shakedown_cluster::status::ClusterStatus;
use shakedown_common::command::Command;
use shakedown_common::{HarnessError, Result};

/// One scripted poll response.
#[derive(Debug)]
enum Step {
    Status(&'static str),
    TransportError,
}

#[derive(Debug)]
struct ScriptedNode {
    launch_output: &'static str,
    steps: Mutex<VecDeque<Step>>,
    polls: AtomicU32,
}

impl ScriptedNode {
    fn new(launch_output: &'static str, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            launch_output,
            steps: Mutex::new(steps.into()),
            polls: AtomicU32::new(0),
        })
    }

    fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterNode for ScriptedNode {
    fn private_addr(&self) -> &str {
        "10.1.1.1"
    }

    fn public_addr(&self) -> &str {
        "203.0.113.1"
    }

    async fn run(&self, _command: &Command) -> Result<String> {
        Ok(String::new())
    }

    async fn status(&self) -> Result<ClusterStatus> {
        Err(HarnessError::NotFound("no status scripted".to_string()))
    }

    async fn is_leader(&self) -> bool {
        false
    }

    async fn block_peer(&self, _peer_addr: &str) -> Result<()> {
        Ok(())
    }

    async fn unblock_peer(&self, _peer_addr: &str) -> Result<()> {
        Ok(())
    }

    async fn launch_operation(&self, _command: &Command) -> Result<String> {
        Ok(self.launch_output.to_string())
    }

    async fn operation_status(&self, _id: &str) -> Result<String> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Status(status)) => Ok(format!("{status}\n")),
            Some(Step::TransportError) => Err(HarnessError::Transport {
                node: "10.1.1.1".to_string(),
                reason: "connection reset by peer".to_string(),
            }),
            None => panic!("poller kept polling past the scripted responses"),
        }
    }
}

fn fast_policy() -> PollPolicy {
    PollPolicy {
        attempts: 10,
        delay: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn extracts_quoted_id_and_polls_to_completion() {
    let node = ScriptedNode::new(
        "launched operation \"abc-def-456\" for upgrade",
        vec![Step::Status("in progress"), Step::Status("completed")],
    );
    let as_node: Arc<dyn ClusterNode> = node.clone();
    let cancel = CancellationToken::new();

    let upgrade = Command::new("sudo clusterctl upgrade");
    let id = run_operation(&as_node, &upgrade, fast_policy(), &cancel)
        .await
        .unwrap();
    assert_eq!(id, "abc-def-456");
    assert_eq!(node.polls(), 2);
}

#[tokio::test]
async fn bare_identifier_output_is_used_directly() {
    let node = ScriptedNode::new("op-123\n", vec![Step::Status("completed")]);
    let as_node: Arc<dyn ClusterNode> = node.clone();
    let cancel = CancellationToken::new();

    let id = run_operation(&as_node, &Command::new("sudo clusterctl leave"), fast_policy(), &cancel)
        .await
        .unwrap();
    assert_eq!(id, "op-123");
    assert_eq!(node.polls(), 1);
}

#[tokio::test]
async fn failed_status_aborts_on_first_observation() {
    let node = ScriptedNode::new("op-666", vec![Step::Status("failed")]);
    let as_node: Arc<dyn ClusterNode> = node.clone();
    let cancel = CancellationToken::new();

    let err = run_operation(&as_node, &Command::new("sudo clusterctl upgrade"), fast_policy(), &cancel)
        .await
        .unwrap_err();
    match err {
        HarnessError::OperationFailed { id, response } => {
            assert_eq!(id, "op-666");
            assert_eq!(response, "failed");
        }
        other => panic!("expected OperationFailed, got {other}"),
    }
    // Never continues past an explicit failure.
    assert_eq!(node.polls(), 1);
}

#[tokio::test]
async fn transport_errors_while_polling_keep_waiting() {
    let node = ScriptedNode::new(
        "op-42",
        vec![Step::TransportError, Step::Status("completed")],
    );
    let as_node: Arc<dyn ClusterNode> = node.clone();
    let cancel = CancellationToken::new();

    run_operation(&as_node, &Command::new("sudo clusterctl upload"), fast_policy(), &cancel)
        .await
        .unwrap();
    assert_eq!(node.polls(), 2);
}

#[tokio::test]
async fn exhausted_poll_budget_reports_the_last_status() {
    let node = ScriptedNode::new(
        "op-7",
        vec![
            Step::Status("in progress"),
            Step::Status("in progress"),
            Step::Status("in progress"),
        ],
    );
    let as_node: Arc<dyn ClusterNode> = node.clone();
    let cancel = CancellationToken::new();
    let policy = PollPolicy {
        attempts: 3,
        delay: Duration::from_millis(1),
    };

    let err = run_operation(&as_node, &Command::new("sudo clusterctl upgrade"), policy, &cancel)
        .await
        .unwrap_err();
    match err {
        HarnessError::RetriesExhausted { attempts, last_reason } => {
            assert_eq!(attempts, 3);
            assert!(last_reason.contains("in progress"), "got {last_reason}");
        }
        other => panic!("expected RetriesExhausted, got {other}"),
    }
}
