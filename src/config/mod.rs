use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::console::history::DEFAULT_HISTORY_SIZE;

/// Default config location, relative to the daemon's working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/mc-manager.toml";
/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "MC_MANAGER_CONFIG";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// 서버 루트 디렉터리 (절대 경로)
    pub server_path: PathBuf,
    /// 시작 스크립트 (run.bat / run.sh)
    #[serde(default = "default_launch_command")]
    pub launch_command: String,
    /// Console encoding label, e.g. "gbk" for a Chinese Windows console
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_capture_window_ms")]
    pub capture_window_ms: u64,
    #[serde(default = "default_max_reply_lines")]
    pub max_reply_lines: usize,
    #[serde(default = "default_max_reply_chars")]
    pub max_reply_chars: usize,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default = "default_ipc_addr")]
    pub ipc_addr: String,
}

fn default_launch_command() -> String {
    if cfg!(target_os = "windows") {
        "run.bat".to_string()
    } else {
        "./run.sh".to_string()
    }
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_capture_window_ms() -> u64 {
    1500
}

fn default_max_reply_lines() -> usize {
    20
}

fn default_max_reply_chars() -> usize {
    1500
}

fn default_history_size() -> usize {
    DEFAULT_HISTORY_SIZE
}

fn default_ipc_addr() -> String {
    "127.0.0.1:57475".to_string()
}

impl Config {
    /// Load from `$MC_MANAGER_CONFIG`, or [`DEFAULT_CONFIG_PATH`].
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&s).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn capture_window(&self) -> Duration {
        Duration::from_millis(self.capture_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::parse(r#"server_path = "/srv/minecraft""#).unwrap();
        assert_eq!(cfg.server_path, PathBuf::from("/srv/minecraft"));
        assert_eq!(cfg.launch_command, default_launch_command());
        assert_eq!(cfg.encoding, "utf-8");
        assert_eq!(cfg.capture_window(), Duration::from_millis(1500));
        assert_eq!(cfg.max_reply_lines, 20);
        assert_eq!(cfg.history_size, DEFAULT_HISTORY_SIZE);
        assert_eq!(cfg.ipc_addr, "127.0.0.1:57475");
    }

    #[test]
    fn test_full_config() {
        let cfg = Config::parse(
            r#"
            server_path = 'D:\servers\mc'
            launch_command = "start.bat"
            encoding = "gbk"
            capture_window_ms = 800
            max_reply_lines = 5
            max_reply_chars = 300
            history_size = 100
            ipc_addr = "0.0.0.0:9000"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.launch_command, "start.bat");
        assert_eq!(cfg.encoding, "gbk");
        assert_eq!(cfg.capture_window(), Duration::from_millis(800));
        assert_eq!(cfg.max_reply_chars, 300);
    }

    #[test]
    fn test_missing_server_path_is_error() {
        assert!(Config::parse(r#"launch_command = "run.bat""#).is_err());
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = Config::load_from("/no/such/dir/mc-manager.toml").unwrap_err();
        assert!(format!("{:#}", err).contains("/no/such/dir/mc-manager.toml"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mc-manager.toml");
        std::fs::write(&path, "server_path = \"/srv/mc\"\ncapture_window_ms = 250\n").unwrap();
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.capture_window_ms, 250);
    }
}
