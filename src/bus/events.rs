use serde::{Deserialize, Serialize};

use crate::bus::platform::Platform;

/// Message direction on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inbound platform message as posted by an adapter (wire DTO).
///
/// Fields the service validates are `Option` so that absence surfaces as a
/// field-named validation error rather than a deserializer rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub platform: Option<Platform>,
    pub platform_message_id: Option<String>,
    pub platform_chat_id: Option<String>,
    pub platform_chat_type: Option<String>,
    pub sender_name: Option<String>,
    pub sender_id: Option<String>,
    pub text: Option<String>,
    pub timestamp: Option<i64>,
    pub platform_meta: Option<serde_json::Value>,
}

/// Request to record a system-generated reply (wire DTO).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    pub platform: Option<Platform>,
    pub platform_chat_id: Option<String>,
    pub text: Option<String>,
    pub in_reply_to: Option<i64>,
}

/// Fully-normalized store input. The store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub direction: Direction,
    pub platform: Platform,
    pub platform_message_id: String,
    pub platform_chat_id: String,
    pub platform_chat_type: Option<String>,
    pub sender_name: String,
    pub sender_id: String,
    pub text: Option<String>,
    pub timestamp: i64,
    pub platform_meta: Option<String>,
}

/// Canonical timeline entry, returned on every surface.
///
/// `platform_meta` carries the adapter's free-form bag as an opaque JSON
/// string; `created_at` is an RFC 3339 UTC timestamp stamped by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub id: i64,
    pub direction: Direction,
    pub platform: Platform,
    pub platform_message_id: String,
    pub platform_chat_id: String,
    pub platform_chat_type: Option<String>,
    pub sender_name: String,
    pub sender_id: String,
    pub text: Option<String>,
    pub timestamp: i64,
    pub platform_meta: Option<String>,
    pub created_at: String,
}

/// Per-conversation aggregates, keyed by (platform, chat id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i64,
    pub platform: Platform,
    pub platform_chat_id: String,
    pub platform_chat_type: Option<String>,
    pub label: String,
    pub first_seen_at: String,
    pub last_message_at: String,
    pub message_count: i64,
}

/// Body of the health check, on both the HTTP and stream surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub ok: bool,
    pub message_count: i64,
    pub conversation_count: i64,
}
