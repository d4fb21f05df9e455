//! End-to-end exercises of the HTTP surface, including the literal
//! request/response scenarios the hub guarantees.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chat_router::gateway::{GatewayState, build_router};
use chat_router::service::RouterService;
use chat_router::store::Store;
use chat_router::trigger::{AcsTrigger, NoopTrigger};

fn make_state(tmp: &TempDir) -> GatewayState {
    let store = Arc::new(Store::open(tmp.path().join("chat-router.db")).unwrap());
    GatewayState {
        service: Arc::new(RouterService::new(store)),
        trigger: Arc::new(NoopTrigger),
        shutdown: CancellationToken::new(),
    }
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_value(resp: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn ingest_then_conversation_aggregates() {
    let tmp = TempDir::new().unwrap();
    let app = build_router(make_state(&tmp));

    let body = r#"{"platform":"telegram","platformMessageId":"m1","platformChatId":"c1","senderName":"Alice","senderId":"u1","timestamp":1700000000000,"text":"hi"}"#;
    let resp = app.clone().oneshot(post("/api/messages", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let entry = body_value(resp).await;
    assert_eq!(entry["id"], 1);
    assert_eq!(entry["direction"], "in");
    assert!(entry["createdAt"].is_string());

    let resp = app
        .oneshot(get("/api/conversations/telegram/c1"))
        .await
        .unwrap();
    let convo = body_value(resp).await;
    assert_eq!(convo["messageCount"], 1);
    assert_eq!(convo["label"], "Alice");
}

#[tokio::test]
async fn response_recording_mints_synthetic_id() {
    let tmp = TempDir::new().unwrap();
    let app = build_router(make_state(&tmp));

    let inbound = r#"{"platform":"telegram","platformMessageId":"m1","platformChatId":"c1","senderName":"Alice","senderId":"u1","timestamp":1700000000000,"text":"hi"}"#;
    app.clone().oneshot(post("/api/messages", inbound)).await.unwrap();

    let body = r#"{"platform":"telegram","platformChatId":"c1","text":"hello","inReplyTo":1}"#;
    let resp = app.oneshot(post("/api/responses", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let entry = body_value(resp).await;
    assert_eq!(entry["id"], 2);
    assert_eq!(entry["direction"], "out");
    assert_eq!(entry["senderName"], "System");
    assert_eq!(entry["platformMessageId"], "router-1");
    assert_eq!(entry["platformMeta"], r#"{"inReplyTo":1}"#);
}

#[tokio::test]
async fn timeline_window_before_cursor() {
    let tmp = TempDir::new().unwrap();
    let app = build_router(make_state(&tmp));

    for n in 1..=5 {
        let body = format!(
            r#"{{"platform":"telegram","platformMessageId":"m{n}","platformChatId":"c1","senderName":"Alice","senderId":"u1","timestamp":1700000000000,"text":"msg {n}"}}"#
        );
        app.clone().oneshot(post("/api/messages", &body)).await.unwrap();
    }

    let resp = app
        .oneshot(get("/api/timeline/telegram/c1?before=4&limit=2"))
        .await
        .unwrap();
    let entries = body_value(resp).await;
    let ids: Vec<i64> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 2]);
}

#[tokio::test]
async fn trigger_receives_prompt_and_failure_keeps_201() {
    let tmp = TempDir::new().unwrap();

    let acs = MockServer::start().await;
    let expected_body = serde_json::json!({
        "args": "-p \"[ROUTER=http://localhost:3100] [PLATFORM=telegram] [CHAT_ID=c1] [IN_REPLY_TO=1] User message: hi\""
    });
    Mock::given(method("POST"))
        .and(path("/api/jobs/relay/trigger"))
        .and(body_json(&expected_body))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&acs)
        .await;

    let store = Arc::new(Store::open(tmp.path().join("chat-router.db")).unwrap());
    let state = GatewayState {
        service: Arc::new(RouterService::new(store)),
        trigger: Arc::new(AcsTrigger::new(&acs.uri(), "relay", "http://localhost:3100")),
        shutdown: CancellationToken::new(),
    };
    let app = build_router(state);

    let body = r#"{"platform":"telegram","platformMessageId":"m1","platformChatId":"c1","senderName":"Alice","senderId":"u1","timestamp":1700000000000,"text":"hi"}"#;
    let resp = app.oneshot(post("/api/messages", body)).await.unwrap();

    // The agent service answered 500, but the ingest is still acknowledged.
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn trigger_not_invoked_without_text() {
    let tmp = TempDir::new().unwrap();

    let acs = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&acs)
        .await;

    let store = Arc::new(Store::open(tmp.path().join("chat-router.db")).unwrap());
    let state = GatewayState {
        service: Arc::new(RouterService::new(store)),
        trigger: Arc::new(AcsTrigger::new(&acs.uri(), "relay", "http://localhost:3100")),
        shutdown: CancellationToken::new(),
    };
    let app = build_router(state);

    let no_text = r#"{"platform":"telegram","platformMessageId":"m1","platformChatId":"c1","senderName":"Alice","senderId":"u1","timestamp":1700000000000}"#;
    let resp = app
        .clone()
        .oneshot(post("/api/messages", no_text))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let outbound = r#"{"platform":"telegram","platformChatId":"c1","text":"hello"}"#;
    let resp = app.oneshot(post("/api/responses", outbound)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn validation_and_lookup_error_bodies() {
    let tmp = TempDir::new().unwrap();
    let app = build_router(make_state(&tmp));

    let missing_chat = r#"{"platform":"telegram","platformMessageId":"m1","senderName":"Alice","senderId":"u1","timestamp":1}"#;
    let resp = app
        .clone()
        .oneshot(post("/api/messages", missing_chat))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err = body_value(resp).await;
    assert!(err["error"].as_str().unwrap().contains("platformChatId"));

    let resp = app
        .oneshot(get("/api/conversations/telegram/ghost"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let err = body_value(resp).await;
    assert_eq!(err["error"], "Conversation not found");
}
