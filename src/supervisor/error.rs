//! Supervisor 전용 에러 타입 — 에러 종류를 구분하여 IPC 핸들러에서
//! 적절한 HTTP 상태 코드를 반환할 수 있게 합니다.
//!
//! None of these are fatal: after any failure the supervisor is still either
//! `Stopped` or `Running` and accepts further operations.

use axum::http::StatusCode;

/// Supervisor 작업 중 발생할 수 있는 에러 유형
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("Server is already running (PID {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("Server is not running")]
    NotRunning,

    #[error("Failed to start server: {0}")]
    SpawnFailed(String),

    #[error("Failed to write to server console: {0}")]
    WriteFailed(String),

    #[error("Command is empty")]
    EmptyCommand,

    #[error("Failed to kill server process tree: {0}")]
    KillFailed(String),
}

impl SupervisorError {
    /// HTTP 상태 코드 매핑
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadyRunning { .. } | Self::NotRunning => StatusCode::CONFLICT,
            Self::EmptyCommand => StatusCode::BAD_REQUEST,
            Self::SpawnFailed(_) | Self::WriteFailed(_) | Self::KillFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON 에러 응답 생성
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning { .. } => "ALREADY_RUNNING",
            Self::NotRunning => "NOT_RUNNING",
            Self::SpawnFailed(_) => "SPAWN_FAILED",
            Self::WriteFailed(_) => "WRITE_FAILED",
            Self::EmptyCommand => "EMPTY_COMMAND",
            Self::KillFailed(_) => "KILL_FAILED",
        }
    }
}

/// axum 핸들러에서 SupervisorError를 직접 반환할 수 있도록 IntoResponse 구현
impl axum::response::IntoResponse for SupervisorError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}
