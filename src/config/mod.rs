use std::path::PathBuf;

use tracing::warn;

/// Default daemon TCP port.
pub const DEFAULT_PORT: u16 = 3100;
/// Database file name inside the data directory.
pub const DB_FILE_NAME: &str = "chat-router.db";

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// `CHAT_ROUTER_PORT` — daemon TCP port.
    pub port: u16,
    /// `CHAT_ROUTER_DATA_DIR` — parent directory of the database file.
    pub data_dir: PathBuf,
    /// `CHAT_ROUTER_URL` — hub base URL used by the CLI and by external
    /// delivery processes.
    pub router_url: String,
    /// `ACS_JOB_NAME` — agent job to trigger on inbound ingest; unset
    /// disables the trigger entirely.
    pub acs_job_name: Option<String>,
    /// `ACS_URL` — agent-execution service base URL.
    pub acs_url: String,
    /// `ROUTER_SELF_URL` — callback URL embedded in trigger prompts.
    pub self_url: String,
}

impl RouterConfig {
    pub fn from_env() -> Self {
        let port = match std::env::var("CHAT_ROUTER_PORT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(
                    "invalid CHAT_ROUTER_PORT {:?}, falling back to {}",
                    raw, DEFAULT_PORT
                );
                DEFAULT_PORT
            }),
            Err(_) => DEFAULT_PORT,
        };

        Self {
            port,
            data_dir: PathBuf::from(env_or("CHAT_ROUTER_DATA_DIR", "./data")),
            router_url: env_or("CHAT_ROUTER_URL", "http://localhost:3100"),
            acs_job_name: non_empty_env("ACS_JOB_NAME"),
            acs_url: env_or("ACS_URL", "http://127.0.0.1:8377"),
            self_url: non_empty_env("ROUTER_SELF_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    /// Stream endpoint derived from the hub base URL.
    pub fn ws_url(&self) -> String {
        let base = self.router_url.trim_end_matches('/');
        let base = base
            .strip_prefix("https://")
            .map(|rest| format!("wss://{}", rest))
            .or_else(|| {
                base.strip_prefix("http://")
                    .map(|rest| format!("ws://{}", rest))
            })
            .unwrap_or_else(|| base.to_string());
        format!("{}/ws", base)
    }
}

fn env_or(var: &str, default: &str) -> String {
    non_empty_env(var).unwrap_or_else(|| default.to_string())
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|value| !value.is_empty())
}
