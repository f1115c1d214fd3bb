//! Raft-style leader election state machine.
//!
//! One [`Node`] per process holds the authoritative record of role, term,
//! vote, leader and peers behind a mutex. Inbound RPC handlers and the
//! single active role executor both go through it; every role or term
//! change funnels into [`Node::transition_locked`], which stops the old
//! executor and spawns the next one inside the same critical section.
//!
//! The mutex is held for O(1) work only and never across network I/O:
//! executors copy `(id, term)` snapshots out, call peers, and re-validate
//! role and term before integrating replies.

use crate::client::PeerTransport;
use crate::config::Config;
use crate::executor;
use crate::error::RpcError;
use crate::types::{NodeId, NodeStatus, RaftMessage, Role, RoleEvent};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Mutable election state, only ever touched under the node mutex.
struct RaftState {
    role: Role,
    term: u64,
    /// Peer granted our vote in the current term
    vote: Option<NodeId>,
    /// Most recently acknowledged leader for the current term
    leader: Option<NodeId>,
    /// Instant of the last valid heartbeat or entry into FOLLOWER
    last_heartbeat: Instant,
    /// Current draw from the configured timeout range
    election_timeout: Duration,
    /// Peers that granted a vote in the current candidacy, self included
    granted: HashSet<NodeId>,
    /// Stop signal of the running role executor
    stop: Option<watch::Sender<bool>>,
}

/// Outcome of integrating one vote reply into the tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VoteTally {
    /// Majority reached, leadership assumed
    Leader,
    /// Still counting
    Counting,
    /// The candidacy this reply belongs to is over
    Stale,
}

/// A cluster node. Create once at startup, share via `Arc`.
pub struct Node {
    pub(crate) id: NodeId,
    app_name: String,
    /// Fixed after startup discovery
    pub(crate) peers: HashMap<NodeId, IpAddr>,
    pub(crate) heartbeat_interval: Duration,
    timeout_range: (Duration, Duration),
    pub(crate) transport: Arc<dyn PeerTransport>,
    events: mpsc::UnboundedSender<RoleEvent>,
    /// Handle to ourselves for spawning executor tasks
    self_handle: Weak<Node>,
    state: Mutex<RaftState>,
}

impl Node {
    pub fn new(
        config: &Config,
        peers: HashMap<NodeId, IpAddr>,
        transport: Arc<dyn PeerTransport>,
        events: mpsc::UnboundedSender<RoleEvent>,
    ) -> Arc<Self> {
        let timeout_range = (config.election_timeout_lower, config.election_timeout_upper);
        Arc::new_cyclic(|self_handle| Self {
            id: config.hostname.clone(),
            app_name: config.app_name.clone(),
            peers,
            heartbeat_interval: config.heartbeat_interval,
            timeout_range,
            transport,
            events,
            self_handle: self_handle.clone(),
            state: Mutex::new(RaftState {
                role: Role::Follower,
                term: 0,
                vote: None,
                leader: None,
                last_heartbeat: Instant::now(),
                election_timeout: draw_timeout(timeout_range),
                granted: HashSet::new(),
                stop: None,
            }),
        })
    }

    /// Start the initial FOLLOWER executor. Called once after discovery.
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.last_heartbeat = Instant::now();
        let _ = self.events.send(RoleEvent::BecameFollower);
        info!("starting as {} at term {}", state.role, state.term);
        self.spawn_executor(&mut state);
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.state.lock().role
    }

    pub fn term(&self) -> u64 {
        self.state.lock().term
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.state.lock().leader.clone()
    }

    /// Snapshot for the operator status endpoint.
    pub fn status(&self) -> NodeStatus {
        let state = self.state.lock();
        NodeStatus {
            app_name: self.app_name.clone(),
            id: self.id.clone(),
            state: state.role,
            term: state.term,
        }
    }

    /// Handle an inbound RequestVote. Returns the local term on grant.
    pub fn handle_request_vote(&self, msg: &RaftMessage) -> Result<u64, RpcError> {
        let mut state = self.state.lock();

        if !self.peers.contains_key(&msg.sender) {
            info!("rejecting vote request from unknown node {}", msg.sender);
            return Err(RpcError::UnknownPeer {
                sender: msg.sender.clone(),
                term: state.term,
            });
        }

        if msg.term < state.term {
            info!(
                "rejecting outdated vote request from {} (term {} < {})",
                msg.sender, msg.term, state.term
            );
            return Err(RpcError::OutdatedTerm {
                got: msg.term,
                term: state.term,
            });
        }

        if msg.term == state.term {
            return match &state.vote {
                None => {
                    info!("granting vote to {} for term {}", msg.sender, state.term);
                    state.vote = Some(msg.sender.clone());
                    Ok(state.term)
                }
                Some(vote) if *vote == msg.sender => Ok(state.term),
                Some(vote) => {
                    info!(
                        "rejecting vote request from {}, already voted for {} in term {}",
                        msg.sender, vote, state.term
                    );
                    Err(RpcError::AlreadyVoted {
                        sender: msg.sender.clone(),
                        term: state.term,
                    })
                }
            };
        }

        // Higher term: adopt it, step down if needed, then grant.
        self.transition_locked(&mut state, Role::Follower, Some(msg.term));
        info!("granting vote to {} for term {}", msg.sender, state.term);
        state.vote = Some(msg.sender.clone());
        Ok(state.term)
    }

    /// Handle an inbound AppendEntries heartbeat. Returns the local term
    /// on acknowledgement.
    pub fn handle_append_entries(&self, msg: &RaftMessage) -> Result<u64, RpcError> {
        let mut state = self.state.lock();

        if !self.peers.contains_key(&msg.sender) {
            info!("rejecting heartbeat from unknown node {}", msg.sender);
            return Err(RpcError::UnknownPeer {
                sender: msg.sender.clone(),
                term: state.term,
            });
        }

        if msg.term < state.term {
            info!(
                "rejecting stale heartbeat from {} (term {} < {})",
                msg.sender, msg.term, state.term
            );
            return Err(RpcError::OutdatedTerm {
                got: msg.term,
                term: state.term,
            });
        }

        // A valid heartbeat makes us a follower of its sender. Equal-term
        // heartbeats to a LEADER cannot arise under the majority rule, but
        // the same step-down answers them.
        if msg.term > state.term || state.role != Role::Follower {
            self.transition_locked(&mut state, Role::Follower, Some(msg.term));
        }
        state.last_heartbeat = Instant::now();
        if state.leader.as_ref() != Some(&msg.sender) {
            info!("recognized {} as leader for term {}", msg.sender, state.term);
            state.leader = Some(msg.sender.clone());
        }
        Ok(state.term)
    }

    /// One follower tick: stand for election once the timeout elapses.
    /// Returns true when this executor should stop.
    pub(crate) fn follower_tick(&self) -> bool {
        let mut state = self.state.lock();
        if state.role != Role::Follower {
            return true;
        }
        if state.last_heartbeat.elapsed() <= state.election_timeout {
            return false;
        }
        if self.peers.is_empty() {
            // An election without peers is meaningless; stay follower.
            debug!("election timeout with no peers, staying {}", state.role);
            state.last_heartbeat = Instant::now();
            return false;
        }
        info!(
            "no heartbeat within {:?}, standing for election",
            state.election_timeout
        );
        self.transition_locked(&mut state, Role::Candidate, None);
        true
    }

    /// Open a candidacy: bump the term, vote for self, seed the tally.
    /// Returns the candidacy term, or None if the role changed under us.
    pub(crate) fn begin_candidacy(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.role != Role::Candidate {
            return None;
        }
        state.term += 1;
        state.vote = Some(self.id.clone());
        state.leader = None;
        state.granted.clear();
        state.granted.insert(self.id.clone());
        info!("starting election for term {}", state.term);
        Some(state.term)
    }

    /// Peers still to solicit in the given candidacy, or None once the
    /// candidacy is over.
    pub(crate) fn pending_voters(&self, candidacy_term: u64) -> Option<Vec<NodeId>> {
        let state = self.state.lock();
        if state.role != Role::Candidate || state.term != candidacy_term {
            return None;
        }
        Some(
            self.peers
                .keys()
                .filter(|peer| !state.granted.contains(*peer))
                .cloned()
                .collect(),
        )
    }

    /// Record a granted vote; assume leadership on strict majority of the
    /// cluster (peers + self).
    pub(crate) fn record_vote(&self, peer: &str, candidacy_term: u64) -> VoteTally {
        let mut state = self.state.lock();
        if state.role != Role::Candidate || state.term != candidacy_term {
            return VoteTally::Stale;
        }
        state.granted.insert(peer.to_string());
        debug!(
            "vote from {} ({}/{})",
            peer,
            state.granted.len(),
            self.peers.len() + 1
        );
        if 2 * state.granted.len() > self.peers.len() + 1 {
            info!(
                "won election for term {} with {}/{} votes",
                state.term,
                state.granted.len(),
                self.peers.len() + 1
            );
            self.transition_locked(&mut state, Role::Leader, None);
            VoteTally::Leader
        } else {
            VoteTally::Counting
        }
    }

    /// Term discovery from an outbound reply. Returns true when the
    /// calling executor stepped down and should stop.
    pub(crate) fn observe_peer_term(&self, peer_term: u64) -> bool {
        let mut state = self.state.lock();
        if peer_term <= state.term {
            return false;
        }
        debug!("term update: {} -> {}", state.term, peer_term);
        self.transition_locked(&mut state, Role::Follower, Some(peer_term));
        true
    }

    /// Leader snapshot for one heartbeat round, or None once deposed.
    pub(crate) fn leader_snapshot(&self) -> Option<(u64, Vec<NodeId>)> {
        let state = self.state.lock();
        if state.role != Role::Leader {
            return None;
        }
        Some((state.term, self.peers.keys().cloned().collect()))
    }

    /// The single choke point for role and term changes.
    ///
    /// Adopting a greater term clears `vote` and `leader` in the same
    /// critical section, so a reader observing the term always observes
    /// vote and leader consistent with it.
    fn transition_locked(
        &self,
        state: &mut RaftState,
        new_role: Role,
        new_term: Option<u64>,
    ) {
        if let Some(term) = new_term {
            if term > state.term {
                state.term = term;
                state.vote = None;
                state.leader = None;
                if state.role == Role::Follower {
                    // Granting a higher-term vote must not race our own
                    // election timer.
                    state.last_heartbeat = Instant::now();
                }
            }
        }

        if new_role == state.role {
            return;
        }

        if let Some(stop) = state.stop.take() {
            let _ = stop.send(true);
        }
        let previous = state.role;
        state.role = new_role;

        match new_role {
            Role::Follower => {
                state.last_heartbeat = Instant::now();
                state.election_timeout = draw_timeout(self.timeout_range);
                let _ = self.events.send(RoleEvent::BecameFollower);
            }
            Role::Candidate => {}
            Role::Leader => {
                state.leader = Some(self.id.clone());
                let _ = self.events.send(RoleEvent::BecameLeader);
            }
        }

        info!(
            "stepping from {} to {} at term {}",
            previous, new_role, state.term
        );
        self.spawn_executor(state);
    }

    fn spawn_executor(&self, state: &mut RaftState) {
        // Upgrading cannot fail while a caller holds the node alive.
        let Some(node) = self.self_handle.upgrade() else {
            return;
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        state.stop = Some(stop_tx);
        executor::spawn(node, state.role, stop_rx);
    }
}

fn draw_timeout((lower, upper): (Duration, Duration)) -> Duration {
    let mut rng = rand::thread_rng();
    let millis = rng.gen_range(lower.as_millis() as u64..=upper.as_millis() as u64);
    Duration::from_millis(millis)
}
