//! Core types for the consensus cluster service

use serde::{Deserialize, Serialize};

/// Unique identifier for a cluster node (its hostname)
pub type NodeId = String;

/// Role in the consensus cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Passive participant, waits for leader heartbeats
    Follower,
    /// Attempting to become leader
    Candidate,
    /// Active leader, emits heartbeats
    Leader,
}

impl Default for Role {
    fn default() -> Self {
        Role::Follower
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Follower => write!(f, "FOLLOWER"),
            Role::Candidate => write!(f, "CANDIDATE"),
            Role::Leader => write!(f, "LEADER"),
        }
    }
}

/// Wire payload shared by the RequestVote and AppendEntries RPCs.
///
/// The log carried by AppendEntries is always empty here, so a heartbeat
/// and an append are the same message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftMessage {
    pub sender: NodeId,
    pub term: u64,
}

/// Outcome of an outbound RPC, uniform across the success and error paths
/// so term discovery reads one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerReply {
    /// Vote granted / append acknowledged
    pub ok: bool,
    /// The peer's current term, from `data.term` or `error.term`
    pub term: u64,
}

/// Emitted on transitions into FOLLOWER or LEADER, consumed by the
/// external payload launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleEvent {
    BecameFollower,
    BecameLeader,
}

/// Snapshot served to operators at `GET /api/v1/raft/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub app_name: String,
    pub id: NodeId,
    pub state: Role,
    pub term: u64,
}
