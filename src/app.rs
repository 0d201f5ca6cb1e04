use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::api::models::Platform;
use crate::error::{Result, SyncError};
use crate::sync::{SendChannel, SyncSettings};
use crate::utils::{normalize_url, stream_url_for};

pub const ENV_BACKEND_URL: &str = "CHAT_SYNC_BACKEND_URL";
pub const ENV_STREAM_URL: &str = "CHAT_SYNC_STREAM_URL";
pub const ENV_LOG: &str = "CHAT_SYNC_LOG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    /// Derived from `backend_url` when unset.
    pub stream_url: Option<String>,
    pub conversation_page_size: u32,
    pub message_page_size: u32,
    pub search_page_size: u32,
    pub search_debounce_ms: u64,
    pub typing_stop_ms: u64,
    /// Remote typists are dropped after this long without a signal.
    pub typing_expiry_ms: u64,
    pub local_identity: String,
    pub send_channel: SendChannel,
    pub default_platform: Platform,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5000".to_string(),
            stream_url: None,
            conversation_page_size: 50,
            message_page_size: 20,
            search_page_size: 50,
            search_debounce_ms: 500,
            typing_stop_ms: 2000,
            typing_expiry_ms: 5000,
            local_identity: "me".to_string(),
            send_channel: SendChannel::Rest,
            default_platform: Platform::Slack,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("chat-sync.toml"))
    }

    /// Config from the default location plus environment overrides. Never fails:
    /// anything unreadable falls back to defaults.
    pub fn load() -> Self {
        Self::default_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
            .with_env()
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(text) = fs::read_to_string(path) else {
            log::debug!("no config at {}, using defaults", path.display());
            return Self::new();
        };
        match toml::from_str::<AppConfig>(&text) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("ignoring unparsable config {}: {e}", path.display());
                Self::new()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::Config(e.to_string()))?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| SyncError::Config(e.to_string()))?;
        fs::write(path, toml).map_err(|e| SyncError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::default_path().ok_or_else(|| SyncError::Config("No config dir".into()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|v| !v.trim().is_empty()) {
            self.backend_url = url;
        }
        if let Some(url) = lookup(ENV_STREAM_URL).filter(|v| !v.trim().is_empty()) {
            self.stream_url = Some(url);
        }
        self
    }

    pub fn with_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn backend_url(&self) -> String {
        normalize_url(&self.backend_url)
    }

    pub fn stream_url(&self) -> Result<Url> {
        match &self.stream_url {
            Some(explicit) => Ok(Url::parse(explicit.trim())?),
            None => stream_url_for(&self.backend_url),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            conversation_page_size: self.conversation_page_size.max(1),
            message_page_size: self.message_page_size.max(1),
            search_page_size: self.search_page_size.max(1),
            search_debounce: Duration::from_millis(self.search_debounce_ms),
            typing_stop: Duration::from_millis(self.typing_stop_ms),
            typing_expiry: Duration::from_millis(self.typing_expiry_ms),
            local_identity: self.local_identity.clone(),
            send_channel: self.send_channel,
            default_platform: self.default_platform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            backend_url = "https://dash.example.com"
            send_channel = "stream"
            message_page_size = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.backend_url, "https://dash.example.com");
        assert_eq!(config.send_channel, SendChannel::Stream);
        assert_eq!(config.message_page_size, 30);
        assert_eq!(config.search_debounce_ms, 500);
        assert_eq!(config.local_identity, "me");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat-sync.toml");
        let config = AppConfig {
            local_identity: "U123".into(),
            default_platform: Platform::Gmail,
            ..AppConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path), config);
    }

    #[test]
    fn missing_or_broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert_eq!(AppConfig::load_from(&missing), AppConfig::default());

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "backend_url = [").unwrap();
        assert_eq!(AppConfig::load_from(&broken), AppConfig::default());
    }

    #[test]
    fn overrides_replace_urls() {
        let config = AppConfig::default().apply_overrides(|key| match key {
            ENV_BACKEND_URL => Some("chat.internal:8080".into()),
            ENV_STREAM_URL => Some("wss://push.internal/socket".into()),
            _ => None,
        });
        assert_eq!(config.backend_url(), "https://chat.internal:8080");
        assert_eq!(config.stream_url().unwrap().as_str(), "wss://push.internal/socket");
    }

    #[test]
    fn settings_carry_durations() {
        let settings = AppConfig::default().sync_settings();
        assert_eq!(settings.search_debounce, Duration::from_millis(500));
        assert_eq!(settings.typing_stop, Duration::from_secs(2));
        assert_eq!(settings.send_channel, SendChannel::Rest);
    }
}
