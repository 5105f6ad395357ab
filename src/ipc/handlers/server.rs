use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::supervisor::SupervisorError;

use super::super::IPCServer;

/// GET /api/server/status - 서버 상태 조회
pub async fn status(State(state): State<IPCServer>) -> Json<Value> {
    Json(json!(state.supervisor.status()))
}

/// POST /api/server/start - 서버 시작 (준비 완료까지 기다리지 않음)
pub async fn start(State(state): State<IPCServer>) -> Result<Json<Value>, SupervisorError> {
    let config = &state.config;
    let pid = state
        .supervisor
        .start(&config.server_path, &config.launch_command)?;

    Ok(Json(json!({
        "success": true,
        "pid": pid,
        "message": format!("Server started with PID {}", pid),
    })))
}

/// POST /api/server/stop - `stop` 명령 전송 (종료는 ServerExited 이벤트로 확인)
pub async fn stop(State(state): State<IPCServer>) -> Result<Json<Value>, SupervisorError> {
    state.supervisor.stop().await?;
    Ok(Json(json!({
        "success": true,
        "message": "Stop command sent",
    })))
}

/// POST /api/server/kill - 프로세스 트리 강제 종료
pub async fn kill(State(state): State<IPCServer>) -> Result<Json<Value>, SupervisorError> {
    state.supervisor.kill()?;
    Ok(Json(json!({
        "success": true,
        "message": "Kill requested",
    })))
}
