//! Events raised to collaborators (chat bridge, IPC clients, ...).

use serde::Serialize;

use crate::console::ChatEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ServerStarted { pid: u32 },
    ChatMessage { speaker: String, message: String },
    /// `code` is `None` when the process was ended by a signal.
    ServerExited { code: Option<i32> },
    ServerStartFailed { reason: String },
}

impl From<ChatEvent> for ServerEvent {
    fn from(chat: ChatEvent) -> Self {
        Self::ChatMessage { speaker: chat.speaker, message: chat.message }
    }
}
