//! Local HTTP control surface for the chat bot and other collaborators.
//!
//! Authorization (which group/user may start or stop the server) is the
//! caller's job; this listener is meant to be bound to localhost.

pub mod handlers;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::supervisor::Supervisor;

/// IPC 요청/응답 타입
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    /// Overrides the configured capture window
    #[serde(default)]
    pub window_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    /// Capture text, bounded by `max_reply_lines` / `max_reply_chars`
    pub output: String,
    /// Number of lines actually captured
    pub lines: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SayRequest {
    pub speaker: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleQuery {
    pub since: Option<u64>,
    pub count: Option<usize>,
}

/// IPC Server State
#[derive(Clone)]
pub struct IPCServer {
    pub supervisor: Supervisor,
    pub config: Arc<Config>,
}

impl IPCServer {
    pub fn new(supervisor: Supervisor, config: Arc<Config>) -> Self {
        Self { supervisor, config }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/server/status", get(handlers::server::status))
            .route("/api/server/start", post(handlers::server::start))
            .route("/api/server/stop", post(handlers::server::stop))
            .route("/api/server/kill", post(handlers::server::kill))
            .route("/api/server/command", post(handlers::command::run_command))
            .route("/api/server/send", post(handlers::command::send_raw))
            .route("/api/server/say", post(handlers::command::say))
            .route("/api/server/console", get(handlers::command::console))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    pub async fn start(self) -> Result<()> {
        let listen_addr = self.config.ipc_addr.clone();
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
        tracing::info!("IPC listening on http://{}", listen_addr);

        axum::serve(listener, router).await?;
        Ok(())
    }
}
