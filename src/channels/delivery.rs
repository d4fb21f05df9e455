//! Outbound delivery: consumes the hub's push stream and relays
//! out-direction entries for one platform to that platform's send API.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{Direction, Platform, TimelineEntry};
use crate::channels::base::{PlatformSender, split_message};

/// Delay before reconnecting after an unintentional disconnect.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Connects to the hub's `/ws` stream and delivers matching push frames via
/// a [`PlatformSender`]. Reconnects after [`RECONNECT_DELAY`] unless the
/// disconnect was intentional; a pending reconnect timer is cancelled by an
/// intentional disconnect.
pub struct OutboundDelivery {
    sender: Arc<dyn PlatformSender>,
    ws_url: String,
    reconnect_delay: Duration,
    shutdown: CancellationToken,
}

impl OutboundDelivery {
    pub fn new(sender: Arc<dyn PlatformSender>, ws_url: impl Into<String>) -> Self {
        Self {
            sender,
            ws_url: ws_url.into(),
            reconnect_delay: RECONNECT_DELAY,
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the reconnect delay (mainly for tests).
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Token cancelled by [`OutboundDelivery::disconnect`]; callers can use
    /// it to observe shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Intentional disconnect: stops the loop and cancels any pending
    /// reconnect timer. The loop never reconnects afterwards.
    pub fn disconnect(&self) {
        self.shutdown.cancel();
    }

    /// Connection loop. Runs until an intentional disconnect.
    pub async fn run(&self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            debug!("connecting to stream at {}", self.ws_url);
            match connect_async(self.ws_url.as_str()).await {
                Ok((socket, _)) => {
                    info!("{} delivery connected to {}", self.sender.platform(), self.ws_url);
                    self.pump(socket).await;
                }
                Err(e) => warn!("stream connection to {} failed: {}", self.ws_url, e),
            }

            if self.shutdown.is_cancelled() {
                break;
            }
            debug!("stream closed, reconnecting in {:?}", self.reconnect_delay);
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        info!("{} delivery stopped", self.sender.platform());
    }

    async fn pump(&self, mut socket: WebSocketStream<MaybeTlsStream<TcpStream>>) {
        loop {
            tokio::select! {
                frame = socket.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_push(&text).await,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("stream socket error: {}", e);
                            break;
                        }
                    }
                }
                () = self.shutdown.cancelled() => break,
            }
        }
    }

    /// Deliver one push frame. Send failures are logged and swallowed so a
    /// flaky platform API never tears down the stream connection.
    async fn handle_push(&self, raw: &str) {
        let Some(entry) = parse_push(raw) else {
            return;
        };
        if !should_deliver(&entry, self.sender.platform()) {
            return;
        }
        let Some(text) = entry.text.as_deref() else {
            return;
        };

        for chunk in split_message(text, self.sender.chunk_limit()) {
            if let Err(e) = self
                .sender
                .send_text(&entry.platform_chat_id, &chunk)
                .await
            {
                warn!(
                    "delivery to {}:{} failed: {}",
                    entry.platform, entry.platform_chat_id, e
                );
            }
        }
    }
}

/// Extract the entry from a `new_message` push frame; anything else
/// (responses, error frames, malformed JSON) is ignored.
fn parse_push(raw: &str) -> Option<TimelineEntry> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    if value.get("type")?.as_str()? != "new_message" {
        return None;
    }
    serde_json::from_value(value.get("entry")?.clone()).ok()
}

/// Deliver iff the entry is outbound, for this adapter's platform, and
/// carries non-empty text.
fn should_deliver(entry: &TimelineEntry, platform: Platform) -> bool {
    entry.direction == Direction::Out
        && entry.platform == platform
        && entry.text.as_deref().is_some_and(|t| !t.is_empty())
}
