use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RouterConfig;
use crate::gateway::{self, GatewayState};
use crate::service::RouterService;
use crate::store::Store;
use crate::trigger::{AcsTrigger, AgentTrigger, NoopTrigger};

#[derive(Parser)]
#[command(name = "chat-router")]
#[command(about = "Multi-platform chat routing hub")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check hub health
    Health,
    /// List conversations by recency
    Conversations {
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one conversation's timeline, or the unified timeline
    Timeline {
        platform: Option<String>,
        chat_id: Option<String>,
        #[arg(long)]
        after: Option<i64>,
        #[arg(long)]
        before: Option<i64>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Ingest an inbound message (JSON body via --json or stdin)
    Ingest {
        #[arg(long)]
        json: Option<String>,
    },
    /// Record an outbound response (JSON body via --json or stdin)
    Respond {
        #[arg(long)]
        json: Option<String>,
    },
}

/// Entry point: a subcommand runs as an HTTP client against a live hub and
/// exits; no subcommand starts the daemon.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = RouterConfig::from_env();

    match cli.command {
        None => daemon(&config).await,
        Some(command) => {
            let output = execute(command, &config).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

async fn execute(command: Commands, config: &RouterConfig) -> Result<serde_json::Value> {
    let client = ApiClient::new(&config.router_url);

    match command {
        Commands::Health => client.get("/api/health", &[]).await,
        Commands::Conversations { platform, limit } => {
            let mut query = Vec::new();
            if let Some(platform) = platform {
                query.push(("platform", platform));
            }
            if let Some(limit) = limit {
                query.push(("limit", limit.to_string()));
            }
            client.get("/api/conversations", &query).await
        }
        Commands::Timeline {
            platform,
            chat_id,
            after,
            before,
            limit,
        } => {
            let mut query = Vec::new();
            if let Some(after) = after {
                query.push(("after", after.to_string()));
            }
            if let Some(before) = before {
                query.push(("before", before.to_string()));
            }
            if let Some(limit) = limit {
                query.push(("limit", limit.to_string()));
            }
            match (platform, chat_id) {
                (Some(platform), Some(chat_id)) => {
                    client
                        .get(&format!("/api/timeline/{}/{}", platform, chat_id), &query)
                        .await
                }
                (None, None) => client.get("/api/timeline", &query).await,
                _ => bail!("timeline takes both a platform and a chat id, or neither"),
            }
        }
        Commands::Ingest { json } => client.post("/api/messages", &read_body(json)?).await,
        Commands::Respond { json } => client.post("/api/responses", &read_body(json)?).await,
    }
}

/// Daemon mode: open the store, wire the service and trigger, serve HTTP
/// plus the stream socket, and shut down cleanly on SIGINT/SIGTERM.
async fn daemon(config: &RouterConfig) -> Result<()> {
    info!("starting chat-router v{}", crate::VERSION);

    let store = Arc::new(Store::open(config.db_path())?);
    let service = Arc::new(RouterService::new(store.clone()));

    let trigger: Arc<dyn AgentTrigger> = match &config.acs_job_name {
        Some(job_name) => {
            info!("agent trigger enabled for job {}", job_name);
            Arc::new(AcsTrigger::new(
                &config.acs_url,
                job_name,
                &config.self_url,
            ))
        }
        None => Arc::new(NoopTrigger),
    };

    let shutdown = CancellationToken::new();
    let state = GatewayState {
        service,
        trigger,
        shutdown: shutdown.clone(),
    };
    let app = gateway::build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("chat-router listening on {}", addr);

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("server error")?;

    store.close()?;
    info!("chat-router stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Body for `ingest`/`respond`: `--json '<...>'` wins, otherwise the whole
/// of stdin is read as JSON.
fn read_body(json: Option<String>) -> Result<serde_json::Value> {
    let raw = match json {
        Some(s) => s,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };
    serde_json::from_str(raw.trim()).context("body is not valid JSON")
}

struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))?;
        parse_response(response).await
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))?;
        parse_response(response).await
    }
}

async fn parse_response(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .with_context(|| format!("invalid JSON response (status {})", status))?;

    if !status.is_success() {
        let message = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("request failed");
        bail!("{} (status {})", message, status);
    }
    Ok(body)
}

#[cfg(test)]
mod tests;
