//! Effective configuration: settings file, then `LEXDESK_*` env overrides.

mod helpers;
mod upload;

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::config::helpers::{optional_env, parse_string_env, parse_u64_env};
use crate::error::ConfigError;
use crate::settings::{Settings, lexdesk_data_dir};

pub use upload::{PROGRESS_CEILING, ProgressMode, UploadConfig};

/// Hard cap on how many suggested questions a chat view shows.
pub const MAX_SUGGESTIONS: usize = 5;

/// Backend connection.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Session persistence.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub token_path: PathBuf,
}

/// Chat view behavior.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub suggestion_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            suggestion_limit: MAX_SUGGESTIONS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub chat: ChatConfig,
    pub upload: UploadConfig,
}

fn validate_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: "LEXDESK_API_URL".to_string(),
        message: format!("'{raw}' is not a valid URL: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: "LEXDESK_API_URL".to_string(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

fn validate_suggestion_limit(raw: u64) -> Result<usize, ConfigError> {
    if raw == 0 || raw > MAX_SUGGESTIONS as u64 {
        return Err(ConfigError::InvalidValue {
            key: "LEXDESK_SUGGESTION_LIMIT".to_string(),
            message: format!("limit must be between 1 and {MAX_SUGGESTIONS}"),
        });
    }
    Ok(raw as usize)
}

fn resolve_token_path(raw: Option<String>) -> Result<PathBuf, ConfigError> {
    match raw {
        Some(path) if path.trim().is_empty() => Err(ConfigError::InvalidValue {
            key: "LEXDESK_TOKEN_PATH".to_string(),
            message: "token path must not be empty".to_string(),
        }),
        Some(path) => Ok(PathBuf::from(path.trim())),
        None => Ok(lexdesk_data_dir().join("token")),
    }
}

impl Config {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let base_url = validate_base_url(&parse_string_env(
            "LEXDESK_API_URL",
            settings.api.base_url.clone(),
        )?)?;
        let timeout = Duration::from_secs(parse_u64_env(
            "LEXDESK_API_TIMEOUT_SECS",
            settings.api.timeout_secs,
        )?);
        let token_path = resolve_token_path(
            optional_env("LEXDESK_TOKEN_PATH")?.or_else(|| settings.session.token_path.clone()),
        )?;

        Ok(Self {
            api: ApiConfig { base_url, timeout },
            session: SessionConfig { token_path },
            chat: ChatConfig {
                suggestion_limit: validate_suggestion_limit(parse_u64_env(
                    "LEXDESK_SUGGESTION_LIMIT",
                    settings.chat.suggestion_limit,
                )?)?,
            },
            upload: UploadConfig::resolve(settings)?,
        })
    }
}
