//! Log Classifier - pure functions over single console lines
//!
//! Minecraft-style console records look like
//! `[12:00:00] [Server thread/INFO]: <Alice> hello`.
//! Anything that does not match is passed through untouched; classification never fails.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `[time] [levelTag]: content`
const METADATA_PATTERN: &str = r"^\[(?P<time>[^\]]*)\]\s*\[(?P<tag>[^\]]*)\]:(?P<content>.*)$";
/// `...]: <speaker> message`
const CHAT_PATTERN: &str = r"\]:\s*<(?P<speaker>[^<>]+)>\s?(?P<message>.*)$";

fn metadata_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(METADATA_PATTERN).expect("metadata pattern is valid"))
}

fn chat_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CHAT_PATTERN).expect("chat pattern is valid"))
}

/// A chat message spoken in game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub speaker: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Strip the `[time] [levelTag]:` prefix and return the trimmed content.
/// Lines without that prefix (crash traces, banners, ...) come back unchanged.
pub fn strip_metadata(line: &str) -> &str {
    match metadata_regex().captures(line).and_then(|caps| caps.name("content")) {
        Some(content) => content.as_str().trim(),
        None => line,
    }
}

/// Extract a chat record. Must be given the original line, since the
/// `]:` marker belongs to the metadata prefix.
pub fn extract_chat(line: &str) -> Option<ChatEvent> {
    let caps = chat_regex().captures(line)?;
    let speaker = caps.name("speaker")?.as_str().trim();
    if speaker.is_empty() {
        return None;
    }
    Some(ChatEvent {
        speaker: speaker.to_string(),
        message: caps.name("message").map_or("", |m| m.as_str()).trim_end().to_string(),
    })
}

/// Parse the severity from the level tag (`Server thread/WARN` → `Warn`).
/// Unrecognised or missing tags default to `Info`.
pub fn parse_level(line: &str) -> LogLevel {
    let Some(tag) = metadata_regex().captures(line).and_then(|caps| caps.name("tag")) else {
        return LogLevel::Info;
    };
    let level = tag.as_str().rsplit('/').next().unwrap_or_default();
    match level.trim().to_uppercase().as_str() {
        "ERROR" | "FATAL" | "SEVERE" => LogLevel::Error,
        "WARN" | "WARNING" => LogLevel::Warn,
        "DEBUG" | "TRACE" => LogLevel::Debug,
        _ => LogLevel::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_metadata() {
        assert_eq!(
            strip_metadata("[12:00:00] [Server thread/INFO]: There are 0 of a max of 20 players online: "),
            "There are 0 of a max of 20 players online:"
        );
        assert_eq!(strip_metadata("[12:00:00] [main/WARN]:   padded  "), "padded");
    }

    #[test]
    fn test_strip_metadata_passthrough() {
        let trace = "\tat net.minecraft.server.MinecraftServer.run(MinecraftServer.java:123)";
        assert_eq!(strip_metadata(trace), trace);
        assert_eq!(strip_metadata("Starting net.minecraft.server.Main"), "Starting net.minecraft.server.Main");
    }

    #[test]
    fn test_strip_metadata_idempotent() {
        let once = strip_metadata("[12:00:00] [Server thread/INFO]: <Alice> hello");
        assert_eq!(once, "<Alice> hello");
        assert_eq!(strip_metadata(once), once);
    }

    #[test]
    fn test_extract_chat() {
        let chat = extract_chat("[12:00:00] [Server thread/INFO]: <Alice> hello").unwrap();
        assert_eq!(chat, ChatEvent { speaker: "Alice".into(), message: "hello".into() });
    }

    #[test]
    fn test_extract_chat_keeps_message_text() {
        let chat = extract_chat("[08:15:42] [Server thread/INFO]: <玩家_01> 今晚 8 点 <开会> 吗?").unwrap();
        assert_eq!(chat.speaker, "玩家_01");
        assert_eq!(chat.message, "今晚 8 点 <开会> 吗?");
    }

    #[test]
    fn test_extract_chat_non_chat_lines() {
        assert_eq!(extract_chat("[12:00:00] [Server thread/INFO]: Alice joined the game"), None);
        assert_eq!(extract_chat("[12:00:00] [Server thread/INFO]: [Server] broadcast"), None);
        assert_eq!(extract_chat("<Alice> hello"), None);
        assert_eq!(extract_chat(""), None);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("[12:00:00] [Server thread/INFO]: Done (5.123s)!"), LogLevel::Info);
        assert_eq!(parse_level("[12:00:00] [Server thread/WARN]: Can't keep up!"), LogLevel::Warn);
        assert_eq!(parse_level("[12:00:00] [Server thread/ERROR]: Encountered an unexpected exception"), LogLevel::Error);
        assert_eq!(parse_level("[12:00:00] [Worker-Main-1/DEBUG]: Reloading ResourceManager"), LogLevel::Debug);
        assert_eq!(parse_level("[12:00:00] [FATAL]: boom"), LogLevel::Error);
        assert_eq!(parse_level("Some random output"), LogLevel::Info);
    }
}
