use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::bus::TimelineEntry;

/// Bound on the whole trigger round-trip so an unresponsive agent service
/// can never hold an ingest response indefinitely.
const TRIGGER_TIMEOUT_SECS: u64 = 30;

/// Side-effect fired after an inbound ingest completes.
///
/// Returns a success indicator; implementations must never propagate errors
/// to the caller — a failed trigger never fails the ingest.
#[async_trait]
pub trait AgentTrigger: Send + Sync {
    async fn fire(&self, entry: &TimelineEntry) -> bool;
}

/// Selected when no agent job is configured.
pub struct NoopTrigger;

#[async_trait]
impl AgentTrigger for NoopTrigger {
    async fn fire(&self, _entry: &TimelineEntry) -> bool {
        false
    }
}

/// Triggers a job on the external agent-execution service over HTTP.
pub struct AcsTrigger {
    client: reqwest::Client,
    base_url: String,
    job_name: String,
    self_url: String,
}

impl AcsTrigger {
    pub fn new(base_url: &str, job_name: &str, self_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(TRIGGER_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            job_name: job_name.to_string(),
            self_url: self_url.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/jobs/{}/trigger", self.base_url, self.job_name)
    }
}

#[async_trait]
impl AgentTrigger for AcsTrigger {
    async fn fire(&self, entry: &TimelineEntry) -> bool {
        let prompt = build_prompt(&self.self_url, entry);
        let body = serde_json::json!({ "args": format!("-p \"{}\"", prompt) });

        let response = match self.client.post(self.endpoint()).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("agent trigger request failed: {}", e);
                return false;
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("agent job {} triggered for entry {}", self.job_name, entry.id);
            true
        } else {
            warn!(
                "agent trigger for entry {} returned status {}",
                entry.id, status
            );
            false
        }
    }
}

/// Single-line prompt handed to the agent job. Double quotes inside the
/// message text are escaped so the prompt survives `-p "<...>"` quoting.
fn build_prompt(self_url: &str, entry: &TimelineEntry) -> String {
    let text = entry.text.as_deref().unwrap_or_default().replace('"', "\\\"");
    format!(
        "[ROUTER={}] [PLATFORM={}] [CHAT_ID={}] [IN_REPLY_TO={}] User message: {}",
        self_url, entry.platform, entry.platform_chat_id, entry.id, text
    )
}
