//! Launch and poll long-running remote operations.
//!
//! Some cluster commands (upgrades, node removal) return immediately with an
//! operation identifier and complete in the background, legitimately taking
//! many minutes. The poller launches the command, extracts the identifier
//! from its output, and polls the operation's textual status until a
//! terminal state is observed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use shakedown_common::command::Command;
use shakedown_common::{Attempt, HarnessError, Result, Retryer};

use crate::node::ClusterNode;

/// Terminal operation statuses; any other value is non-terminal and keeps
/// the poller waiting.
pub const OP_STATUS_COMPLETED: &str = "completed";
pub const OP_STATUS_FAILED: &str = "failed";

/// Attempt ceiling and fixed delay for operation polling. The defaults
/// accommodate operations that run for many minutes.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 1000,
            delay: Duration::from_secs(20),
        }
    }
}

/// Extracts the operation identifier from launch output.
///
/// The output is either the bare identifier, or a free-text sentence
/// embedding the identifier in double quotes (e.g.
/// `launched operation "abc-def-456" for upgrade`). No more specific format
/// is required of the embedding sentence.
pub fn parse_operation_id(output: &str) -> String {
    let trimmed = output.trim();
    if let Some(open) = trimmed.find('"') {
        if let Some(len) = trimmed[open + 1..].find('"') {
            return trimmed[open + 1..open + 1 + len].to_string();
        }
    }
    trimmed.to_string()
}

/// Launches `command` on `node` and polls the resulting operation until it
/// terminates. Returns the operation identifier on completion.
///
/// Transport errors while polling are themselves keep-waiting, not fatal;
/// only an explicit `failed` status aborts, with the response captured in
/// the error.
pub async fn run_operation(
    node: &Arc<dyn ClusterNode>,
    command: &Command,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<String> {
    let output = node.launch_operation(command).await?;
    let id = parse_operation_id(&output);
    info!(node = node.private_addr(), operation = %id, "launched operation");

    let retry = Retryer::new(policy.attempts, policy.delay);
    retry
        .run(cancel, || {
            let node = node.clone();
            let id = id.clone();
            async move {
                let response = match node.operation_status(&id).await {
                    Ok(response) => response,
                    Err(err) => {
                        return Attempt::retry(format!("operation {id} status unavailable: {err}"))
                    }
                };
                match response.trim() {
                    OP_STATUS_COMPLETED => Attempt::Done(()),
                    OP_STATUS_FAILED => Attempt::Abort(HarnessError::OperationFailed {
                        id: id.clone(),
                        response: response.trim().to_string(),
                    }),
                    other => Attempt::retry(format!("non-terminal operation status: {other:?}")),
                }
            }
        })
        .await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_identifier_passes_through() {
        assert_eq!(parse_operation_id("op-123"), "op-123");
        assert_eq!(parse_operation_id("  op-123\n"), "op-123");
    }

    #[test]
    fn quoted_identifier_is_extracted_from_a_sentence() {
        assert_eq!(
            parse_operation_id("launched operation \"abc-def-456\" for upgrade"),
            "abc-def-456"
        );
    }

    #[test]
    fn unterminated_quote_falls_back_to_the_whole_output() {
        assert_eq!(parse_operation_id("oops \"half"), "oops \"half");
    }
}
