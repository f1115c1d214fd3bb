//! HTTP surface of a cluster node.
//!
//! Three raft routes form the peer wire protocol; the health route serves
//! liveness probes. Handlers translate between HTTP and the election
//! core, which takes every decision under the node mutex.

pub mod envelope;

use crate::api::envelope::{ApiErrorResponse, ApiResponse, RequestContext};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use ccs_core::{Node, RaftMessage};
use std::sync::Arc;

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/api/v1/raft/vote", put(request_vote))
        .route("/api/v1/raft/log", post(append_log))
        .route("/api/v1/raft/", get(raft_status))
        .route("/api/v1/health/", get(health))
        .with_state(node)
}

/// `PUT /api/v1/raft/vote`: a candidate soliciting our vote.
async fn request_vote(
    State(node): State<Arc<Node>>,
    ctx: RequestContext,
    payload: Result<Json<RaftMessage>, JsonRejection>,
) -> Response {
    let status = node.status();
    let msg = match payload {
        Ok(Json(msg)) => msg,
        Err(rejection) => {
            return ApiErrorResponse::bad_request(
                ctx,
                &status.app_name,
                &status.id,
                status.term,
                rejection.body_text(),
            )
        }
    };
    match node.handle_request_vote(&msg) {
        Ok(term) => ApiResponse::new(
            ctx,
            RaftMessage {
                sender: node.id().clone(),
                term,
            },
        )
        .into_response(),
        Err(error) => ApiErrorResponse::from_rpc(ctx, &status.app_name, &status.id, &error),
    }
}

/// `POST /api/v1/raft/log`: a leader heartbeat; the log stays empty.
async fn append_log(
    State(node): State<Arc<Node>>,
    ctx: RequestContext,
    payload: Result<Json<RaftMessage>, JsonRejection>,
) -> Response {
    let status = node.status();
    let msg = match payload {
        Ok(Json(msg)) => msg,
        Err(rejection) => {
            return ApiErrorResponse::bad_request(
                ctx,
                &status.app_name,
                &status.id,
                status.term,
                rejection.body_text(),
            )
        }
    };
    match node.handle_append_entries(&msg) {
        Ok(term) => ApiResponse::new(
            ctx,
            RaftMessage {
                sender: node.id().clone(),
                term,
            },
        )
        .into_response(),
        Err(error) => ApiErrorResponse::from_rpc(ctx, &status.app_name, &status.id, &error),
    }
}

/// `GET /api/v1/raft/`: role, term and identity for operators.
async fn raft_status(State(node): State<Arc<Node>>, ctx: RequestContext) -> Response {
    ApiResponse::new(ctx, node.status()).into_response()
}

/// `GET /api/v1/health/`: 200 while the service is up.
async fn health() -> &'static str {
    "healthy"
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use ccs_core::{ClientError, Config, PeerReply, PeerTransport};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    struct UnreachableTransport;

    #[async_trait]
    impl PeerTransport for UnreachableTransport {
        async fn request_vote(
            &self,
            _peer: &str,
            _msg: RaftMessage,
        ) -> Result<PeerReply, ClientError> {
            Err(ClientError::MalformedResponse)
        }

        async fn append_entries(
            &self,
            _peer: &str,
            _msg: RaftMessage,
        ) -> Result<PeerReply, ClientError> {
            Err(ClientError::MalformedResponse)
        }
    }

    fn test_node() -> Arc<Node> {
        let config = Config {
            hostname: "replica-1".to_string(),
            app_name: "consensus-cluster-service".to_string(),
            port: 80,
            election_timeout_lower: Duration::from_millis(1500),
            election_timeout_upper: Duration::from_millis(3000),
            heartbeat_interval: Duration::from_millis(1000),
            num_replicas: None,
            script_leader_path: None,
            script_follower_path: None,
        };
        let peers: HashMap<_, _> = [("replica-2", "10.0.0.2"), ("replica-3", "10.0.0.3")]
            .into_iter()
            .map(|(id, ip)| (id.to_string(), ip.parse().unwrap()))
            .collect();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        // Receiver dropped on purpose; event sends are best-effort.
        Node::new(&config, peers, Arc::new(UnreachableTransport), events_tx)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_vote_grant_envelope() {
        let app = router(test_node());

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/v1/raft/vote?context=election-round-1",
                r#"{"sender": "replica-2", "term": 1}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["apiVersion"], "1.0");
        assert_eq!(body["context"], "election-round-1");
        assert!(body["id"].is_string());
        assert_eq!(body["data"]["sender"], "replica-1");
        assert_eq!(body["data"]["term"], 1);
    }

    #[tokio::test]
    async fn test_vote_rejection_carries_term() {
        let node = test_node();
        // Vote already granted to replica-3 this term.
        node.handle_request_vote(&RaftMessage {
            sender: "replica-3".to_string(),
            term: 1,
        })
        .unwrap();
        let app = router(node);

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/v1/raft/vote",
                r#"{"sender": "replica-2", "term": 1}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["term"], 1);
        assert_eq!(body["error"]["sender"], "replica-1");
        assert_eq!(body["error"]["status_code"], 400);
        assert_eq!(
            body["error"]["id"],
            "consensus-cluster-service.ALREADY_VOTED"
        );
    }

    #[tokio::test]
    async fn test_unknown_peer_rejected() {
        let app = router(test_node());

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/v1/raft/vote",
                r#"{"sender": "intruder", "term": 1}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["id"], "consensus-cluster-service.UNKNOWN_PEER");
    }

    #[tokio::test]
    async fn test_malformed_body_rejected_with_details() {
        let app = router(test_node());

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/v1/raft/vote",
                r#"{"sender": 42}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["id"], "consensus-cluster-service.BAD_REQUEST");
        assert!(body["error"]["details"].is_string());
    }

    #[tokio::test]
    async fn test_heartbeat_acknowledged() {
        let node = test_node();
        let app = router(node.clone());

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/raft/log",
                r#"{"sender": "replica-2", "term": 3}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["term"], 3);
        assert_eq!(node.leader().as_deref(), Some("replica-2"));
    }

    #[tokio::test]
    async fn test_stale_heartbeat_rejected() {
        let node = test_node();
        node.handle_append_entries(&RaftMessage {
            sender: "replica-2".to_string(),
            term: 7,
        })
        .unwrap();
        let app = router(node);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/raft/log",
                r#"{"sender": "replica-3", "term": 6}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["term"], 7);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = router(test_node());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/raft/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["app_name"], "consensus-cluster-service");
        assert_eq!(body["data"]["id"], "replica-1");
        assert_eq!(body["data"]["state"], "FOLLOWER");
        assert_eq!(body["data"]["term"], 0);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(test_node());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
