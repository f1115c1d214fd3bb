//! Error taxonomy for the consensus cluster service.
//!
//! Inbound RPC rejections always carry the responder's current term so the
//! calling peer can perform term discovery unilaterally. Outbound failures
//! collapse to "no response" for the executors. Startup errors are fatal.

use crate::types::NodeId;
use std::time::Duration;

/// Rejection of an inbound RequestVote or AppendEntries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("node id {sender} unknown")]
    UnknownPeer { sender: NodeId, term: u64 },

    #[error("outdated term: {got}")]
    OutdatedTerm { got: u64, term: u64 },

    #[error("did not vote for {sender}")]
    AlreadyVoted { sender: NodeId, term: u64 },
}

impl RpcError {
    /// The responder's term at the time of rejection.
    pub fn term(&self) -> u64 {
        match self {
            RpcError::UnknownPeer { term, .. } => *term,
            RpcError::OutdatedTerm { term, .. } => *term,
            RpcError::AlreadyVoted { term, .. } => *term,
        }
    }

    /// Stable identifier used in error envelopes.
    pub fn id(&self) -> &'static str {
        match self {
            RpcError::UnknownPeer { .. } => "UNKNOWN_PEER",
            RpcError::OutdatedTerm { .. } => "OUTDATED_TERM",
            RpcError::AlreadyVoted { .. } => "ALREADY_VOTED",
        }
    }
}

/// Outbound RPC failure. Executors log these at INFO and move on.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("peer returned a body without a term")]
    MalformedResponse,
}

/// Fatal configuration or discovery failure; the process exits.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("election timeout bounds inverted: {lower:?} > {upper:?}")]
    TimeoutBoundsInverted { lower: Duration, upper: Duration },

    #[error("heartbeat interval {heartbeat:?} must be below the election timeout lower bound {lower:?}")]
    HeartbeatTooSlow { heartbeat: Duration, lower: Duration },

    #[error("cluster of {size} nodes has no unambiguous majority")]
    EvenClusterSize { size: usize },

    #[error("expected {expected} replicas, found {found}")]
    ReplicaCountMismatch { expected: usize, found: usize },

    #[error("dns lookup failed: {0}")]
    Dns(#[from] hickory_resolver::error::ResolveError),

    #[error("no address found for {0}")]
    UnresolvedHost(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_carries_responder_term() {
        let err = RpcError::OutdatedTerm { got: 2, term: 7 };
        assert_eq!(err.term(), 7);
        assert_eq!(err.id(), "OUTDATED_TERM");

        let err = RpcError::AlreadyVoted {
            sender: "node-2".to_string(),
            term: 3,
        };
        assert_eq!(err.term(), 3);
    }
}
