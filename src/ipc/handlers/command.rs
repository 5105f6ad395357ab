use std::time::Duration;

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::{json, Value};

use crate::supervisor::SupervisorError;

use super::super::{CommandRequest, CommandResponse, ConsoleQuery, IPCServer, SayRequest, SendRequest};

const DEFAULT_CONSOLE_COUNT: usize = 100;

/// POST /api/server/command - 명령어 실행 후 출력 캡처
pub async fn run_command(
    State(state): State<IPCServer>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, SupervisorError> {
    let config = &state.config;
    let window = req
        .window_ms
        .map_or_else(|| config.capture_window(), Duration::from_millis);

    let output = state.supervisor.run_command(&req.command, window).await?;
    let truncated = output.exceeds(config.max_reply_lines, config.max_reply_chars);

    Ok(Json(CommandResponse {
        success: true,
        output: output.truncated(config.max_reply_lines, config.max_reply_chars),
        lines: output.line_count(),
        truncated,
    }))
}

/// POST /api/server/send - 응답을 기다리지 않는 콘솔 입력
pub async fn send_raw(
    State(state): State<IPCServer>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Value>, SupervisorError> {
    state.supervisor.send_raw(&req.command).await?;
    Ok(Json(json!({ "success": true })))
}

/// POST /api/server/say - 채팅 플랫폼 메시지를 게임 안으로 중계
pub async fn say(
    State(state): State<IPCServer>,
    Json(req): Json<SayRequest>,
) -> Result<Json<Value>, SupervisorError> {
    state.supervisor.say(&req.speaker, &req.message).await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/server/console?since=<id>&count=<n> - 콘솔 기록 조회
pub async fn console(State(state): State<IPCServer>, Query(query): Query<ConsoleQuery>) -> Json<Value> {
    let lines = match query.since {
        Some(since) => state.supervisor.console_since(since),
        None => state.supervisor.recent_console(query.count.unwrap_or(DEFAULT_CONSOLE_COUNT)),
    };
    Json(json!({ "lines": lines }))
}
