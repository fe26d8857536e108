//! # Shakedown Common
//!
//! Shared building blocks for the shakedown failover harness:
//!
//! - [`error`] - The harness-wide error taxonomy and `Result` alias
//! - [`wait`] - The three-outcome retry/wait engine every polling loop is built on
//! - [`command`] - Remote command value types and output parsers
//!
//! Everything in this crate is transport-agnostic; the concrete SSH channel
//! and node types live in `shakedown-cluster`.

pub mod command;
pub mod error;
pub mod wait;

pub use command::Command;
pub use error::{HarnessError, Result};
pub use wait::{with_deadline, Attempt, Retryer};
