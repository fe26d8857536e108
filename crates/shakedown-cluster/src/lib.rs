//! # Shakedown Cluster
//!
//! Chaos-style failover testing against a live cluster of peer nodes.
//!
//! The harness finds the current leader, isolates it behind a firewall-level
//! network partition, waits for the remaining majority to elect a
//! replacement, verifies the partitioned cluster is still healthy, heals the
//! partition, and confirms the two previously separated halves converge to a
//! single, active status.
//!
//! ## Components
//!
//! - [`node`] - The [`ClusterNode`] capability trait and the SSH-backed
//!   concrete node
//! - [`ssh`] - Remote execution channel with reconnect and offline handling
//! - [`status`] - Cluster status document model and fan-out status queries
//! - [`leader`] - Leader detection across nodes that may disagree
//! - [`partition`] - Two-way network partition install/remove
//! - [`operation`] - Long-running remote operation launch and polling
//! - [`failover`] - The end-to-end failover scenario a test suite invokes
//!
//! ## Scope
//!
//! The harness only exercises and observes a cluster that already exists; it
//! does not provision machines or manage cluster lifecycle. Product-specific
//! command strings are thin glue behind the [`ClusterNode`] trait.

pub mod failover;
pub mod leader;
pub mod node;
pub mod operation;
pub mod partition;
pub mod ssh;
pub mod status;

pub use failover::{FailoverRunner, Timeouts};
pub use node::{ClusterNode, SshNode};
pub use partition::Partition;
pub use ssh::SshChannel;
pub use status::{ClusterState, ClusterStatus, StatusReport};
