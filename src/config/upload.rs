use std::str::FromStr;
use std::time::Duration;

use crate::config::helpers::{parse_string_env, parse_u64_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Highest percentage a progress source may report before the server answers.
pub const PROGRESS_CEILING: u8 = 95;

/// How upload progress is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Derived from bytes actually streamed to the server.
    Measured,
    /// Timer-driven ramp, indicative only.
    Simulated,
}

impl FromStr for ProgressMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "measured" => Ok(Self::Measured),
            "simulated" => Ok(Self::Simulated),
            other => Err(ConfigError::InvalidValue {
                key: "LEXDESK_UPLOAD_PROGRESS".to_string(),
                message: format!("unsupported progress mode '{other}'"),
            }),
        }
    }
}

impl ProgressMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Measured => "measured",
            Self::Simulated => "simulated",
        }
    }
}

/// Document upload feedback.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub progress: ProgressMode,
    /// Interval of the simulated ramp.
    pub tick: Duration,
    /// Percentage added per simulated tick.
    pub step_percent: u8,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            progress: ProgressMode::Measured,
            tick: Duration::from_millis(200),
            step_percent: 5,
        }
    }
}

fn validate_tick_ms(raw: u64) -> Result<Duration, ConfigError> {
    if raw == 0 {
        return Err(ConfigError::InvalidValue {
            key: "LEXDESK_UPLOAD_TICK_MS".to_string(),
            message: "tick must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(raw))
}

fn validate_step_percent(raw: u64) -> Result<u8, ConfigError> {
    if raw == 0 || raw > u64::from(PROGRESS_CEILING) {
        return Err(ConfigError::InvalidValue {
            key: "LEXDESK_UPLOAD_STEP_PERCENT".to_string(),
            message: format!("step must be between 1 and {PROGRESS_CEILING}"),
        });
    }
    Ok(raw as u8)
}

impl UploadConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let progress_raw =
            parse_string_env("LEXDESK_UPLOAD_PROGRESS", settings.upload.progress.clone())?;
        Ok(Self {
            progress: progress_raw.parse()?,
            tick: validate_tick_ms(parse_u64_env(
                "LEXDESK_UPLOAD_TICK_MS",
                settings.upload.tick_ms,
            )?)?,
            step_percent: validate_step_percent(parse_u64_env(
                "LEXDESK_UPLOAD_STEP_PERCENT",
                settings.upload.step_percent,
            )?)?,
        })
    }
}
