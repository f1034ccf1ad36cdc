//! User-editable settings persisted as TOML.
//!
//! These are the raw values before environment overrides and validation;
//! see [`crate::config::Config::resolve`] for the effective configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const SETTINGS_FILE_NAME: &str = "settings.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub session: SessionSettings,
    pub chat: ChatSettings,
    pub upload: UploadSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Where the bearer token is kept between runs. `None` means the
    /// platform data directory.
    pub token_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub suggestion_limit: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            suggestion_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// `measured` or `simulated`.
    pub progress: String,
    pub tick_ms: u64,
    pub step_percent: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            progress: "measured".to_string(),
            tick_ms: 200,
            step_percent: 5,
        }
    }
}

/// `~/.config/lexdesk` on Linux, the platform equivalent elsewhere.
pub fn lexdesk_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lexdesk")
}

/// `~/.local/share/lexdesk` on Linux, the platform equivalent elsewhere.
pub fn lexdesk_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lexdesk")
}

pub fn default_settings_path() -> PathBuf {
    lexdesk_config_dir().join(SETTINGS_FILE_NAME)
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings file at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
