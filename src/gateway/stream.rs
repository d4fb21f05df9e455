//! Streaming transport at `/ws`: framed-JSON request/response queries plus
//! push broadcast of every new timeline entry.
//!
//! Client -> Server (JSON, discriminated by `type`):
//! `health`, `conversations`, `timeline`, `unified_timeline`.
//!
//! Server -> Client:
//! `{"type":"response","requestType":...,"data":...}` for answered requests,
//! `{"type":"new_message","entry":...}` pushed on every persisted entry,
//! `{"type":"error","message":...}` for malformed frames; the connection
//! stays open after an error frame.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::bus::{Platform, TimelineEntry};
use crate::gateway::GatewayState;
use crate::service::RouterService;
use crate::store::TimelineQuery;

/// Outgoing frames buffered per client before backpressure applies.
const CLIENT_SEND_BUFFER: usize = 64;

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Serve one stream client: a writer task draining an mpsc queue, a push
/// task forwarding the service event stream, and the request/response loop.
/// Each client owns its broadcast receiver, so a slow or failing client
/// never affects the others.
async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_SEND_BUFFER);

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut events = state.service.subscribe();
    let push_tx = tx.clone();
    let push_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(entry) => {
                    let frame = push_frame(&entry);
                    if push_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("stream client lagged, dropped {} push frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_frame(&state.service, &text);
                        if tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary; ping/pong handled by axum
                    Some(Err(e)) => {
                        debug!("stream socket error: {}", e);
                        break;
                    }
                }
            }
            () = state.shutdown.cancelled() => break,
        }
    }

    push_task.abort();
    drop(tx);
    let _ = writer_task.await;
}

/// Client request frames, discriminated by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamRequest {
    Health,
    Conversations {
        platform: Option<Platform>,
        limit: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Timeline {
        platform: Platform,
        platform_chat_id: String,
        after: Option<i64>,
        before: Option<i64>,
        limit: Option<u32>,
    },
    UnifiedTimeline {
        after: Option<i64>,
        before: Option<i64>,
        limit: Option<u32>,
    },
}

impl StreamRequest {
    fn request_type(&self) -> &'static str {
        match self {
            StreamRequest::Health => "health",
            StreamRequest::Conversations { .. } => "conversations",
            StreamRequest::Timeline { .. } => "timeline",
            StreamRequest::UnifiedTimeline { .. } => "unified_timeline",
        }
    }
}

/// Answer a single request frame. Malformed JSON, unknown types and service
/// failures all come back as error frames; the caller keeps the connection.
fn handle_frame(service: &RouterService, raw: &str) -> String {
    let request: StreamRequest = match serde_json::from_str(raw) {
        Ok(r) => r,
        Err(e) => return error_frame(&format!("invalid request: {}", e)),
    };

    let request_type = request.request_type();
    let data = match request {
        StreamRequest::Health => service.health().map(to_value),
        StreamRequest::Conversations { platform, limit } => {
            service.conversations(platform, limit).map(to_value)
        }
        StreamRequest::Timeline {
            platform,
            platform_chat_id,
            after,
            before,
            limit,
        } => {
            let query = TimelineQuery {
                after,
                before,
                limit,
            };
            service
                .timeline(platform, &platform_chat_id, &query)
                .map(to_value)
        }
        StreamRequest::UnifiedTimeline {
            after,
            before,
            limit,
        } => {
            let query = TimelineQuery {
                after,
                before,
                limit,
            };
            service.unified_timeline(&query).map(to_value)
        }
    };

    match data {
        Ok(data) => json!({
            "type": "response",
            "requestType": request_type,
            "data": data,
        })
        .to_string(),
        Err(e) => error_frame(&e.to_string()),
    }
}

fn push_frame(entry: &TimelineEntry) -> String {
    json!({ "type": "new_message", "entry": entry }).to_string()
}

fn error_frame(message: &str) -> String {
    json!({ "type": "error", "message": message }).to_string()
}

fn to_value<T: Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
