use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::upload::RedactionLevel;

/// Reconnect policy for the event channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Consecutive failed attempts before the channel reports `failed`
    pub attempts: u32,
    /// Fixed spacing between attempts
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_ms: 1000,
        }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Wire names of the pushed alert events, as carried in the SSE `event:` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventNames {
    pub document_alert: String,
    pub transcription_alert: String,
}

impl Default for EventNames {
    fn default() -> Self {
        Self {
            document_alert: "pii_detected".into(),
            transcription_alert: "pii_alert".into(),
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub upload_path: String,
    pub live_transcription_path: String,
    pub events_path: String,
    pub default_level: RedactionLevel,
    pub reconnect: ReconnectConfig,
    pub alert_sound: bool,
    pub events: EventNames,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            upload_path: "/upload".into(),
            live_transcription_path: "/live_transcription".into(),
            events_path: "/events".into(),
            default_level: RedactionLevel::Basic,
            reconnect: ReconnectConfig::default(),
            alert_sound: true,
            events: EventNames::default(),
        }
    }
}

impl Config {
    /// Directory: ~/.config/pii-guard/
    fn dir() -> PathBuf {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("pii-guard");
        p
    }

    fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from disk, returning defaults if file doesn't exist or is invalid.
    pub fn load() -> Self {
        let path = Self::path();
        match fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let dir = Self::dir();
        fs::create_dir_all(&dir)?;
        let data = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(), data)?;
        Ok(())
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), path)
    }
}
