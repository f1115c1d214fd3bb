//! JSON envelopes shared by every route.
//!
//! Each response carries a top-level `apiVersion`, a server-generated
//! request `id`, and the `context` correlation string echoed from the
//! query parameter of the same name. Errors wrap an `error` object that
//! includes the responder's identity and term, which peers rely on for
//! term discovery.

use axum::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ccs_core::{NodeId, RpcError};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use uuid::Uuid;

pub const API_VERSION: &str = "1.0";

/// Request-scoped correlation data, available to every handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Server-generated request id
    pub id: String,
    /// Caller-provided correlation string
    pub context: Option<String>,
}

#[derive(Deserialize)]
struct ContextQuery {
    context: Option<String>,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = Query::<ContextQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|query| query.0.context);
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            context,
        })
    }
}

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(rename = "apiVersion")]
    pub api_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub id: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(ctx: RequestContext, data: T) -> Self {
        Self {
            api_version: API_VERSION,
            context: ctx.context,
            id: ctx.id,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Error envelope.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    #[serde(rename = "apiVersion")]
    pub api_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Application-name-prefixed error identifier
    pub id: String,
    pub message: String,
    pub status_code: u16,
    /// Responder identity and term, for peer term discovery
    pub sender: NodeId,
    pub term: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiErrorResponse {
    pub fn new(ctx: RequestContext, status: StatusCode, error: ErrorBody) -> Response {
        let envelope = Self {
            api_version: API_VERSION,
            context: ctx.context,
            id: ctx.id,
            error,
        };
        (status, Json(envelope)).into_response()
    }

    /// Map an election-layer rejection to a 400 envelope.
    pub fn from_rpc(ctx: RequestContext, app_name: &str, sender: &NodeId, error: &RpcError) -> Response {
        Self::new(
            ctx,
            StatusCode::BAD_REQUEST,
            ErrorBody {
                id: format!("{}.{}", app_name, error.id()),
                message: error.to_string(),
                status_code: StatusCode::BAD_REQUEST.as_u16(),
                sender: sender.clone(),
                term: error.term(),
                details: None,
            },
        )
    }

    /// Map a malformed request body to a 400 envelope with details.
    pub fn bad_request(
        ctx: RequestContext,
        app_name: &str,
        sender: &NodeId,
        term: u64,
        details: String,
    ) -> Response {
        Self::new(
            ctx,
            StatusCode::BAD_REQUEST,
            ErrorBody {
                id: format!("{}.BAD_REQUEST", app_name),
                message: "Malformed request.".to_string(),
                status_code: StatusCode::BAD_REQUEST.as_u16(),
                sender: sender.clone(),
                term,
                details: Some(serde_json::Value::String(details)),
            },
        )
    }
}
