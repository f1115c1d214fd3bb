//! Consensus Cluster Service core library.
//!
//! Raft-style leader election for a set of DNS-discovered replicas:
//! terms, randomized election timeouts, majority voting and heartbeats.
//! The HTTP surface lives in the node binary; this crate owns the state
//! machine, the role executors, the peer client and discovery.

pub mod client;
pub mod config;
pub mod discovery;
pub mod election;
pub mod error;
mod executor;
pub mod types;

pub use client::{HttpPeerClient, PeerTransport};
pub use config::Config;
pub use election::Node;
pub use error::{ClientError, RpcError, StartupError};
pub use types::{NodeId, NodeStatus, PeerReply, RaftMessage, Role, RoleEvent};
