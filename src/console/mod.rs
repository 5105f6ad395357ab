//! Console text protocol: decoding, classification, command capture and history.

pub mod capture;
pub mod classifier;
pub mod decoder;
pub mod history;

pub use capture::{CaptureWindow, CapturedOutput};
pub use classifier::{extract_chat, parse_level, strip_metadata, ChatEvent, LogLevel};
pub use decoder::{resolve_encoding, LineDecoder};
pub use history::{ConsoleHistory, LogLine, LogSource};
