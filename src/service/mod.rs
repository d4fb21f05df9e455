use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::bus::{
    Conversation, Direction, HealthStatus, InboundMessage, NewEntry, OutboundRequest, Platform,
    TimelineEntry,
};
use crate::errors::{RouterError, RouterResult};
use crate::store::{Store, TimelineQuery};

/// Buffered events per subscriber before a slow consumer starts lagging.
const EVENT_BUFFER: usize = 256;

/// Sender identity stamped on system-generated replies.
const SYSTEM_SENDER_NAME: &str = "System";
const SYSTEM_SENDER_ID: &str = "system";

/// The authoritative business-logic layer: validation, normalization,
/// synthetic outbound ids, and an observable stream of persisted entries.
///
/// Every successful mutation is published on a broadcast channel; transports
/// subscribe via [`RouterService::subscribe`] and the service knows nothing
/// about them.
pub struct RouterService {
    store: Arc<Store>,
    events: broadcast::Sender<TimelineEntry>,
    response_seq: AtomicU64,
}

impl RouterService {
    pub fn new(store: Arc<Store>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            store,
            events,
            response_seq: AtomicU64::new(0),
        }
    }

    /// Subscribe to newly persisted timeline entries. Order per subscriber
    /// matches id-assignment order.
    pub fn subscribe(&self) -> broadcast::Receiver<TimelineEntry> {
        self.events.subscribe()
    }

    /// Validate, normalize and persist an inbound platform message.
    pub fn ingest_message(&self, msg: InboundMessage) -> RouterResult<TimelineEntry> {
        let platform = msg
            .platform
            .ok_or_else(|| RouterError::invalid("platform", "is required"))?;
        let platform_message_id = require_non_empty(msg.platform_message_id, "platformMessageId")?;
        let platform_chat_id = require_non_empty(msg.platform_chat_id, "platformChatId")?;
        let sender_name = require_non_empty(msg.sender_name, "senderName")?;
        let sender_id = require_non_empty(msg.sender_id, "senderId")?;
        // Null-ness, not falsy-ness: a timestamp of 0 is accepted.
        let timestamp = msg
            .timestamp
            .ok_or_else(|| RouterError::invalid("timestamp", "is required"))?;

        let entry = NewEntry {
            direction: Direction::In,
            platform,
            platform_message_id,
            platform_chat_id,
            platform_chat_type: msg.platform_chat_type,
            sender_name: sender_name.clone(),
            sender_id,
            text: msg.text,
            timestamp,
            platform_meta: msg.platform_meta.map(|v| v.to_string()),
        };

        let stored = self.store.ingest(&entry, &sender_name)?;
        self.publish(&stored);
        Ok(stored)
    }

    /// Record a system-generated reply, minting a `router-N` message id.
    pub fn record_response(&self, req: OutboundRequest) -> RouterResult<TimelineEntry> {
        let platform = req
            .platform
            .ok_or_else(|| RouterError::invalid("platform", "is required"))?;
        let platform_chat_id = require_non_empty(req.platform_chat_id, "platformChatId")?;
        let text = require_non_empty(req.text, "text")?;

        let seq = self.response_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let platform_meta = req
            .in_reply_to
            .map(|id| serde_json::json!({ "inReplyTo": id }).to_string());

        let entry = NewEntry {
            direction: Direction::Out,
            platform,
            platform_message_id: format!("router-{}", seq),
            platform_chat_id,
            platform_chat_type: None,
            sender_name: SYSTEM_SENDER_NAME.to_string(),
            sender_id: SYSTEM_SENDER_ID.to_string(),
            text: Some(text),
            timestamp: Utc::now().timestamp_millis(),
            platform_meta,
        };

        let stored = self.store.ingest(&entry, SYSTEM_SENDER_NAME)?;
        self.publish(&stored);
        Ok(stored)
    }

    pub fn timeline(
        &self,
        platform: Platform,
        chat_id: &str,
        query: &TimelineQuery,
    ) -> RouterResult<Vec<TimelineEntry>> {
        Ok(self.store.timeline(platform, chat_id, query)?)
    }

    pub fn unified_timeline(&self, query: &TimelineQuery) -> RouterResult<Vec<TimelineEntry>> {
        Ok(self.store.unified_timeline(query)?)
    }

    pub fn conversations(
        &self,
        platform: Option<Platform>,
        limit: Option<u32>,
    ) -> RouterResult<Vec<Conversation>> {
        Ok(self.store.conversations(platform, limit)?)
    }

    pub fn conversation(&self, platform: Platform, chat_id: &str) -> RouterResult<Conversation> {
        self.store
            .conversation(platform, chat_id)?
            .ok_or(RouterError::NotFound)
    }

    pub fn health(&self) -> RouterResult<HealthStatus> {
        let stats = self.store.stats()?;
        Ok(HealthStatus {
            ok: true,
            message_count: stats.message_count,
            conversation_count: stats.conversation_count,
        })
    }

    fn publish(&self, entry: &TimelineEntry) {
        // Err means no live subscribers, which is fine for a live feed.
        if self.events.send(entry.clone()).is_err() {
            debug!("no stream subscribers for entry {}", entry.id);
        }
    }
}

fn require_non_empty(value: Option<String>, field: &str) -> RouterResult<String> {
    match value {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(RouterError::invalid(field, "must be a non-empty string")),
    }
}
