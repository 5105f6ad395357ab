use std::sync::Arc;
use std::time::Duration;

use mc_manager::config::Config;
use mc_manager::console::resolve_encoding;
use mc_manager::ipc::IPCServer;
use mc_manager::supervisor::{ServerEvent, Supervisor, SupervisorOptions};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// How long Ctrl+C waits for a graceful stop before killing the server.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("mc-manager starting");

    let config = Arc::new(Config::load()?);
    let supervisor = Supervisor::new(SupervisorOptions {
        encoding: resolve_encoding(&config.encoding),
        history_size: config.history_size,
    });

    // 이벤트 로깅 — 채팅 브리지가 붙기 전까지의 기본 구독자
    let mut events = supervisor.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ServerEvent::ChatMessage { speaker, message }) => {
                    tracing::info!("[chat] <{}> {}", speaker, message);
                }
                Ok(ServerEvent::ServerStarted { pid }) => tracing::info!("Server up (PID {})", pid),
                Ok(ServerEvent::ServerExited { code }) => {
                    tracing::warn!("Server went down (exit code: {:?})", code);
                }
                Ok(ServerEvent::ServerStartFailed { reason }) => {
                    tracing::error!("Server failed to start: {}", reason);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event logger lagged, skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Graceful shutdown: Ctrl+C 시 stop → 유예 시간 후 kill
    let supervisor_shutdown = supervisor.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received, cleaning up...");
        shutdown(&supervisor_shutdown).await;
        tracing::info!("Cleanup complete, exiting");
        std::process::exit(0);
    });

    let ipc_server = IPCServer::new(supervisor, config);
    if let Err(e) = ipc_server.start().await {
        tracing::error!("IPC server error: {}", e);
    }

    tracing::info!("mc-manager shutting down");
    Ok(())
}

async fn shutdown(supervisor: &Supervisor) {
    if !supervisor.is_running() {
        return;
    }
    let mut events = supervisor.subscribe();
    if let Err(e) = supervisor.stop().await {
        tracing::warn!("Graceful stop failed: {}", e);
        if supervisor.kill().is_err() {
            return;
        }
    }

    let exited = tokio::time::timeout(SHUTDOWN_GRACE, async {
        loop {
            match events.recv().await {
                Ok(ServerEvent::ServerExited { .. }) | Err(broadcast::error::RecvError::Closed) => break,
                _ => {}
            }
        }
    })
    .await;

    if exited.is_err() {
        tracing::warn!("Server did not exit within {:?}, killing it", SHUTDOWN_GRACE);
        if let Err(e) = supervisor.kill() {
            tracing::error!("Kill failed: {}", e);
        }
    }
}
