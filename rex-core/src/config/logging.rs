//! Logging configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

const LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Channels of the [`Logger`](crate::logging::Logger) that print.
///
/// `true` enables every channel, `false` silences all but `print`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogChannels {
    All(bool),
    Only(Vec<String>),
}

impl Default for LogChannels {
    fn default() -> Self {
        LogChannels::Only(vec!["error".to_string(), "warn".to_string(), "deprecate".to_string()])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Backend filter used by `init_logging` when `RUST_LOG` is unset
    /// Env: REX_LOG_LEVEL
    /// Default: "info"
    pub level: String,

    /// Env: REX_LOG_PREFIX
    /// Default: "[ReX]"
    pub prefix: String,

    pub channels: LogChannels,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), prefix: "[ReX]".to_string(), channels: LogChannels::default() }
    }
}

impl LoggingConfig {
    pub fn apply_env_vars(&mut self) {
        if let Ok(level) = env::var("REX_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(prefix) = env::var("REX_LOG_PREFIX") {
            self.prefix = prefix;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            bail!("Invalid log level: {} (expected one of {})", self.level, LEVELS.join(", "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_level_fails() {
        let cfg = LoggingConfig { level: "verbose".to_string(), ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = LoggingConfig { level: "DEBUG".to_string(), ..Default::default() };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_channels_forms() {
        let cfg: LoggingConfig = toml::from_str("channels = true").unwrap();
        assert_eq!(cfg.channels, LogChannels::All(true));
        let cfg: LoggingConfig = toml::from_str(r#"channels = ["info"]"#).unwrap();
        assert_eq!(cfg.channels, LogChannels::Only(vec!["info".to_string()]));
    }
}
