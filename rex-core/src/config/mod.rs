//! Configuration for Rex applications
//!
//! Values are resolved in the following order (highest priority wins):
//!
//! 1. **Code** (builder methods on [`App`](crate::App))
//! 2. **Environment variables** (`REX_*`)
//! 3. **Config file** (`rex.toml`)
//! 4. **Defaults**
//!
//! # Example
//!
//! ```no_run
//! use rex_core::config::RexConfig;
//!
//! let config = RexConfig::load()?;
//! let config = RexConfig::from_file("rex.toml")?;
//! let config = RexConfig::default();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod dispatch;
pub mod logging;
pub mod server;

pub use dispatch::{BodyParsing, DispatchConfig};
pub use logging::{LogChannels, LoggingConfig};
pub use server::ServerConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete Rex configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RexConfig {
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

impl RexConfig {
    /// `rex.toml` from the working directory, or defaults, with `REX_*` applied on top
    pub fn load() -> Result<Self> {
        Self::load_from("rex.toml")
    }

    /// Like [`load`](Self::load) with an explicit file; a missing file means defaults
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() { Self::from_file(path)? } else { Self::default() };
        config.apply_env_vars();
        Ok(config)
    }

    /// Parse one TOML file; sections and keys it leaves out keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
    }

    pub fn apply_env_vars(&mut self) {
        self.server.apply_env_vars();
        self.dispatch.apply_env_vars();
        self.logging.apply_env_vars();
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.dispatch.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RexConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.dispatch.body_parsing.body_parser());
        assert!(!config.dispatch.force_async);
        assert_eq!(config.dispatch.max_inline_file_size, 102_400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 3000

[dispatch]
prefer_json_errors = true
body_parsing = {{ body_parser = true, multipart_parser = false, cookie_parser = true }}
"#
        )
        .unwrap();

        let config = RexConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.dispatch.prefer_json_errors);
        assert!(config.dispatch.body_parsing.body_parser());
        assert!(!config.dispatch.body_parsing.multipart_parser());
        assert_eq!(config.logging.prefix, "[ReX]");
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RexConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, RexConfig::default().server.port);
    }

    #[test]
    fn test_load_from_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dispatch]\nmax_inline_file_size = 2048").unwrap();
        let config = RexConfig::load_from(file.path()).unwrap();
        assert_eq!(config.dispatch.max_inline_file_size, 2048);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        let err = RexConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid TOML in"));
    }
}
