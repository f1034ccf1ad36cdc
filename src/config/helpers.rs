use std::env::VarError;

use crate::error::ConfigError;

/// Read an env var, treating unset and blank the same.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid unicode".to_string(),
        }),
    }
}

pub(crate) fn parse_string_env(key: &str, default: String) -> Result<String, ConfigError> {
    Ok(optional_env(key)?.unwrap_or(default))
}

pub(crate) fn parse_u64_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    match optional_env(key)? {
        Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a non-negative integer: {e}"),
        }),
        None => Ok(default),
    }
}
