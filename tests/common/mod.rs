#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use chat_router::bus::{InboundMessage, OutboundRequest, Platform};
use chat_router::gateway::{GatewayState, build_router};
use chat_router::service::RouterService;
use chat_router::store::Store;
use chat_router::trigger::NoopTrigger;

/// Spawn a hub (store + service + HTTP/stream router) on an ephemeral port.
pub async fn spawn_hub(db_path: &Path) -> (SocketAddr, Arc<RouterService>) {
    let store = Arc::new(Store::open(db_path).unwrap());
    let service = Arc::new(RouterService::new(store));
    let state = GatewayState {
        service: service.clone(),
        trigger: Arc::new(NoopTrigger),
        shutdown: CancellationToken::new(),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, service)
}

pub fn inbound(chat_id: &str, text: &str) -> InboundMessage {
    InboundMessage {
        platform: Some(Platform::Telegram),
        platform_message_id: Some("m1".to_string()),
        platform_chat_id: Some(chat_id.to_string()),
        platform_chat_type: None,
        sender_name: Some("Alice".to_string()),
        sender_id: Some("u1".to_string()),
        text: Some(text.to_string()),
        timestamp: Some(1_700_000_000_000),
        platform_meta: None,
    }
}

pub fn outbound(platform: Platform, chat_id: &str, text: &str) -> OutboundRequest {
    OutboundRequest {
        platform: Some(platform),
        platform_chat_id: Some(chat_id.to_string()),
        text: Some(text.to_string()),
        in_reply_to: None,
    }
}
