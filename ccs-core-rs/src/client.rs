//! Outbound peer RPCs over HTTP.
//!
//! Success and rejection both carry the peer's current term (`data.term`
//! on 200, `error.term` otherwise), so executors integrate one reply
//! shape. Anything else, connection failure, timeout, body without a
//! term, is "no response" and retried on a later tick.

use crate::error::ClientError;
use crate::types::{PeerReply, RaftMessage};
use async_trait::async_trait;
use std::time::Duration;

/// Paths of the peer wire protocol
pub const VOTE_PATH: &str = "/api/v1/raft/vote";
pub const LOG_PATH: &str = "/api/v1/raft/log";

/// Seam between the executors and the network. Production uses
/// [`HttpPeerClient`]; tests substitute scripted transports.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn request_vote(&self, peer: &str, msg: RaftMessage) -> Result<PeerReply, ClientError>;

    async fn append_entries(&self, peer: &str, msg: RaftMessage) -> Result<PeerReply, ClientError>;
}

/// Reqwest-backed transport dialing peers by hostname.
pub struct HttpPeerClient {
    http: reqwest::Client,
    port: u16,
}

impl HttpPeerClient {
    /// Build a client with the given per-call deadline.
    pub fn new(timeout: Duration, port: u16) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, port })
    }

    async fn call(
        &self,
        request: reqwest::RequestBuilder,
        msg: &RaftMessage,
    ) -> Result<PeerReply, ClientError> {
        let response = request.json(msg).send().await?;
        let ok = response.status().is_success();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|_| ClientError::MalformedResponse)?;
        let term = if ok {
            body.pointer("/data/term")
        } else {
            body.pointer("/error/term")
        };
        let term = term
            .and_then(serde_json::Value::as_u64)
            .ok_or(ClientError::MalformedResponse)?;
        Ok(PeerReply { ok, term })
    }

    fn url(&self, peer: &str, path: &str) -> String {
        format!("http://{}:{}{}", peer, self.port, path)
    }
}

#[async_trait]
impl PeerTransport for HttpPeerClient {
    async fn request_vote(&self, peer: &str, msg: RaftMessage) -> Result<PeerReply, ClientError> {
        self.call(self.http.put(self.url(peer, VOTE_PATH)), &msg).await
    }

    async fn append_entries(&self, peer: &str, msg: RaftMessage) -> Result<PeerReply, ClientError> {
        self.call(self.http.post(self.url(peer, LOG_PATH)), &msg).await
    }
}
