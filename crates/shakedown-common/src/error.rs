use thiserror::Error;

/// Error taxonomy for the failover harness.
///
/// The variants map onto the distinct failure classes the orchestrator cares
/// about: ambiguous cluster observations (`NotFound`, `BadState`), transport
/// and command failures on a single node, explicit remote operation failures,
/// exhausted retry budgets, and cancellation. `Stage` wraps any of the above
/// with the name of the failover stage that produced it, so a test report can
/// pinpoint which part of the sequence broke.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Expected cluster state was not observed (e.g. no node claims leadership).
    #[error("not found: {0}")]
    NotFound(String),

    /// Nodes disagree in a way that should never be silently resolved
    /// (e.g. multiple simultaneous leaders).
    #[error("inconsistent cluster state: {0}")]
    BadState(String),

    /// The node was deliberately powered off; commands fail fast instead of hanging.
    #[error("node {node} is offline")]
    Offline { node: String },

    /// Could not reach the node at all (connection refused, ssh transport error).
    #[error("transport error on {node}: {reason}")]
    Transport { node: String, reason: String },

    /// The remote command ran but exited nonzero.
    #[error("command `{command}` on {node} exited with code {code:?}: {stderr}")]
    CommandFailed {
        node: String,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A long-running remote operation explicitly reported failure.
    #[error("operation {id} failed: {response}")]
    OperationFailed { id: String, response: String },

    /// A firewall rule install/remove failed; names the exact rule and peer.
    #[error("partition rule ({direction} {peer}) on {node}: {reason}")]
    PartitionRule {
        node: String,
        direction: &'static str,
        peer: String,
        reason: String,
    },

    /// The retry engine consumed its attempt budget without success.
    #[error("retries exhausted after {attempts} attempts: {last_reason}")]
    RetriesExhausted { attempts: u32, last_reason: String },

    /// The enclosing deadline fired or the caller cancelled.
    #[error("cancelled {0}")]
    Cancelled(String),

    /// A node returned a status document that does not parse.
    #[error("invalid status document from {node}: {source}")]
    InvalidStatus {
        node: String,
        #[source]
        source: serde_json::Error,
    },

    /// Any error annotated with the failover stage it originated from.
    #[error("{stage}: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<HarnessError>,
    },
}

impl HarnessError {
    /// Wraps the error with the name of the failover stage that produced it.
    pub fn stage(self, stage: &'static str) -> Self {
        HarnessError::Stage {
            stage,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
