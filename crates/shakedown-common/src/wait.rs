//! Bounded retry with a three-way attempt outcome.
//!
//! Every polling loop in the harness is built on [`Retryer`]: an attempt
//! function is invoked repeatedly and reports one of three outcomes —
//! finished, keep waiting, or stop immediately. This keeps "not yet" distinct
//! from "broken", which ordinary `Result` returns conflate.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Outcome of a single retry attempt.
///
/// - `Done` ends the loop successfully with a value.
/// - `Retry` asks for another attempt after the fixed delay; the reason is
///   kept and attached to the final error if the budget runs out.
/// - `Abort` ends the loop immediately with the given error, no further
///   attempts. Partial progress must be reported as an explicit `Retry`,
///   never silently ignored.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    Retry(String),
    Abort(HarnessError),
}

impl<T> Attempt<T> {
    /// Convenience constructor for a keep-waiting outcome.
    pub fn retry(reason: impl Into<String>) -> Self {
        Attempt::Retry(reason.into())
    }
}

/// Fixed-delay retry policy: an attempt ceiling and the pause between
/// keep-waiting outcomes. Constructed per call site and discarded after.
#[derive(Debug, Clone, Copy)]
pub struct Retryer {
    /// Maximum number of attempts before giving up.
    pub attempts: u32,
    /// Fixed delay between keep-waiting outcomes.
    pub delay: Duration,
}

impl Retryer {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Runs `attempt` until it returns [`Attempt::Done`] or [`Attempt::Abort`],
    /// the attempt ceiling is reached, or `cancel` fires.
    ///
    /// Both the attempt itself and the inter-attempt sleep are raced against
    /// `cancel`: a hung attempt does not outlive the deadline, and
    /// cancellation mid-delay returns [`HarnessError::Cancelled`] without
    /// waiting the delay out. Exhausting the ceiling returns
    /// [`HarnessError::RetriesExhausted`] carrying the last keep-waiting
    /// reason for diagnosis.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut last_reason = String::from("no attempts made");
        for n in 1..=self.attempts {
            if cancel.is_cancelled() {
                return Err(HarnessError::Cancelled(format!("before attempt {n}")));
            }
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(HarnessError::Cancelled(format!("during attempt {n}")));
                }
                outcome = attempt() => outcome,
            };
            match outcome {
                Attempt::Done(value) => return Ok(value),
                Attempt::Abort(err) => return Err(err),
                Attempt::Retry(reason) => {
                    debug!(attempt = n, max = self.attempts, reason = %reason, "retrying");
                    last_reason = reason;
                }
            }
            if n < self.attempts {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(HarnessError::Cancelled(format!("while waiting after attempt {n}")));
                    }
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
        }
        Err(HarnessError::RetriesExhausted {
            attempts: self.attempts,
            last_reason,
        })
    }

    /// Returns a token that cancels itself once `timeout` elapses.
    ///
    /// Callers bind a whole retry loop (or a sequence of them) to one
    /// deadline by passing the same token to each `run` call. The sleeper
    /// task exits as soon as the token is cancelled from either side, so a
    /// scenario that finishes early can release it by cancelling the token
    /// (e.g. through a [`CancellationToken::drop_guard`]).
    pub fn deadline_token(timeout: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let deadline = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => deadline.cancel(),
                _ = deadline.cancelled() => {}
            }
        });
        token
    }
}

/// Races a fallible future against a cancellation token.
///
/// Lets a caller bind a single blocking step to the same deadline its retry
/// loops use; a fired token wins with [`HarnessError::Cancelled`] naming the
/// interrupted step.
pub async fn with_deadline<T>(
    cancel: &CancellationToken,
    what: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(HarnessError::Cancelled(format!("during {what}"))),
        result = fut => result,
    }
}
