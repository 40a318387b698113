//! Application configuration loaded from JSON.
//!
//! Every field is optional; `{}` yields the defaults.

use passhotp_engine::hotp::{MAX_DIGITS, MAX_WINDOW};
use passhotp_strategy::strategy::StrategyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Log output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `passhotp_strategy=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub strategy: StrategyConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let strategy = &self.strategy;
        if strategy.code_field.trim().is_empty() {
            return Err(ConfigError::Invalid("codeField must not be empty".into()));
        }
        if strategy.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".into()));
        }
        if strategy.digits == 0 || strategy.digits > MAX_DIGITS {
            return Err(ConfigError::Invalid(format!(
                "digits must be between 1 and {}, got {}",
                MAX_DIGITS, strategy.digits
            )));
        }
        if strategy.window > MAX_WINDOW {
            return Err(ConfigError::Invalid(format!(
                "window must be at most {}, got {}",
                MAX_WINDOW, strategy.window
            )));
        }
        Ok(())
    }
}
