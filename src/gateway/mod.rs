/// HTTP API for the routing hub.
///
/// Exposes the service under `/api` with JSON bodies and mounts the
/// streaming socket at `/ws`. Inbound ingest additionally awaits the
/// configured agent trigger before acknowledging, so an agent job is
/// guaranteed to have been attempted by the time the adapter sees 201.
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use crate::bus::{Direction, InboundMessage, OutboundRequest, Platform};
use crate::errors::RouterError;
use crate::service::RouterService;
use crate::store::TimelineQuery;
use crate::trigger::AgentTrigger;

pub mod stream;

/// Shared state between HTTP handlers and stream connections.
#[derive(Clone)]
pub struct GatewayState {
    pub service: Arc<RouterService>,
    pub trigger: Arc<dyn AgentTrigger>,
    /// Cancelled on daemon shutdown so long-lived stream connections close
    /// promptly instead of pinning the graceful-shutdown phase.
    pub shutdown: CancellationToken,
}

/// Build the full router: `/api` endpoints plus the `/ws` stream socket.
/// Cross-origin requests are permitted from any origin.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/messages", post(ingest_message_handler))
        .route("/api/responses", post(record_response_handler))
        .route("/api/timeline", get(unified_timeline_handler))
        .route(
            "/api/timeline/{platform}/{chat_id}",
            get(conversation_timeline_handler),
        )
        .route("/api/conversations", get(list_conversations_handler))
        .route(
            "/api/conversations/{platform}/{chat_id}",
            get(get_conversation_handler),
        )
        .route("/api/health", get(health_handler))
        .route("/ws", get(stream::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct TimelineParams {
    after: Option<i64>,
    before: Option<i64>,
    limit: Option<u32>,
}

impl TimelineParams {
    fn to_query(&self) -> TimelineQuery {
        TimelineQuery {
            after: self.after,
            before: self.before,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConversationParams {
    platform: Option<String>,
    limit: Option<u32>,
}

/// POST /api/messages — ingest an inbound platform message.
async fn ingest_message_handler(
    State(state): State<GatewayState>,
    payload: Result<Json<InboundMessage>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };

    match state.service.ingest_message(body) {
        Ok(entry) => {
            // The trigger is awaited so the 201 is held until the agent job
            // has been attempted; its failure never fails the ingest.
            if entry.direction == Direction::In && entry.text.is_some() {
                let fired = state.trigger.fire(&entry).await;
                debug!("agent trigger for entry {}: fired={}", entry.id, fired);
            }
            (StatusCode::CREATED, Json(entry)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// POST /api/responses — record a system-generated reply.
async fn record_response_handler(
    State(state): State<GatewayState>,
    payload: Result<Json<OutboundRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };

    match state.service.record_response(body) {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/timeline/{platform}/{chat_id} — one conversation, newest first.
async fn conversation_timeline_handler(
    State(state): State<GatewayState>,
    Path((platform, chat_id)): Path<(String, String)>,
    Query(params): Query<TimelineParams>,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match state
        .service
        .timeline(platform, &chat_id, &params.to_query())
    {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/timeline — all conversations interleaved, newest first.
async fn unified_timeline_handler(
    State(state): State<GatewayState>,
    Query(params): Query<TimelineParams>,
) -> Response {
    match state.service.unified_timeline(&params.to_query()) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/conversations — conversations by recency.
async fn list_conversations_handler(
    State(state): State<GatewayState>,
    Query(params): Query<ConversationParams>,
) -> Response {
    let platform = match params.platform.as_deref().map(parse_platform) {
        None => None,
        Some(Ok(p)) => Some(p),
        Some(Err(resp)) => return resp,
    };
    match state.service.conversations(platform, params.limit) {
        Ok(conversations) => Json(conversations).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/conversations/{platform}/{chat_id} — a single conversation.
async fn get_conversation_handler(
    State(state): State<GatewayState>,
    Path((platform, chat_id)): Path<(String, String)>,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match state.service.conversation(platform, &chat_id) {
        Ok(conversation) => Json(conversation).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/health — health check body.
async fn health_handler(State(state): State<GatewayState>) -> Response {
    match state.service.health() {
        Ok(health) => Json(health).into_response(),
        Err(e) => error_response(&e),
    }
}

fn parse_platform(raw: &str) -> Result<Platform, Response> {
    raw.parse::<Platform>()
        .map_err(|message| bad_request(&message))
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn error_response(err: &RouterError) -> Response {
    match err {
        RouterError::InvalidInput(message) => bad_request(message),
        RouterError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Conversation not found" })),
        )
            .into_response(),
        RouterError::Internal(e) => {
            error!("internal error: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}
