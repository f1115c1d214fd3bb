//! Role executors.
//!
//! Exactly one executor task runs per node. Each loops on a
//! `tokio::select!` of its stop signal and an interval ticking at the
//! heartbeat cadence, takes its decisions through [`Node`] methods under
//! the node mutex, and does all network I/O with the mutex released.
//! A deposed executor observes its stop signal at the next wait boundary.

use crate::election::{Node, VoteTally};
use crate::types::{RaftMessage, Role};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Whether the executor keeps ticking or stops after this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Continue,
    Stop,
}

/// Spawn the executor task for the given role.
pub(crate) fn spawn(node: Arc<Node>, role: Role, stop: watch::Receiver<bool>) {
    tokio::spawn(async move {
        match role {
            Role::Follower => run_follower(node, stop).await,
            Role::Candidate => run_candidate(node, stop).await,
            Role::Leader => run_leader(node, stop).await,
        }
    });
}

/// Watch for the election timeout; stand for election when it fires.
async fn run_follower(node: Arc<Node>, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval(node.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                if node.follower_tick() {
                    break;
                }
            }
        }
    }
    debug!("follower executor stopped");
}

/// Solicit votes from every peer that has not granted one yet, retrying
/// the unreached each tick until the candidacy ends.
async fn run_candidate(node: Arc<Node>, mut stop: watch::Receiver<bool>) {
    let Some(term) = node.begin_candidacy() else {
        return;
    };
    let mut ticker = interval(node.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                if solicit_votes(&node, term).await == Tick::Stop {
                    break;
                }
            }
        }
    }
    debug!("candidate executor stopped");
}

async fn solicit_votes(node: &Arc<Node>, term: u64) -> Tick {
    let Some(waiting) = node.pending_voters(term) else {
        return Tick::Stop;
    };
    for peer in waiting {
        let msg = RaftMessage {
            sender: node.id().clone(),
            term,
        };
        match node.transport.request_vote(&peer, msg).await {
            Err(error) => {
                info!("no vote response from {}: {}", peer, error);
            }
            Ok(reply) if reply.ok => match node.record_vote(&peer, term) {
                VoteTally::Counting => {}
                VoteTally::Leader | VoteTally::Stale => return Tick::Stop,
            },
            Ok(reply) => {
                // A rejection carrying a higher term ends the candidacy
                // before the remaining requests of this round.
                if node.observe_peer_term(reply.term) {
                    return Tick::Stop;
                }
            }
        }
    }
    Tick::Continue
}

/// Emit heartbeats to every peer in parallel each tick.
async fn run_leader(node: Arc<Node>, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval(node.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                if broadcast_heartbeats(&node).await == Tick::Stop {
                    break;
                }
            }
        }
    }
    debug!("leader executor stopped");
}

async fn broadcast_heartbeats(node: &Arc<Node>) -> Tick {
    let Some((term, peers)) = node.leader_snapshot() else {
        return Tick::Stop;
    };
    let calls = peers.into_iter().map(|peer| {
        let node = node.clone();
        async move {
            let msg = RaftMessage {
                sender: node.id().clone(),
                term,
            };
            let reply = node.transport.append_entries(&peer, msg).await;
            (peer, reply)
        }
    });
    for (peer, reply) in join_all(calls).await {
        match reply {
            Err(error) => {
                info!("no heartbeat acknowledgement from {}: {}", peer, error);
            }
            Ok(reply) if !reply.ok => {
                if node.observe_peer_term(reply.term) {
                    return Tick::Stop;
                }
            }
            Ok(_) => {}
        }
    }
    Tick::Continue
}
