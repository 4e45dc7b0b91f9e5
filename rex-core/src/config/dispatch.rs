//! Dispatcher configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

use crate::response::DEFAULT_MAX_INLINE_FILE_SIZE;

/// Which built-in parsers run ahead of every chain.
///
/// `true`/`false` toggles all of them; the detailed form picks each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BodyParsing {
    Enabled(bool),
    Detailed {
        #[serde(default)]
        body_parser: bool,
        #[serde(default)]
        multipart_parser: bool,
        #[serde(default)]
        cookie_parser: bool,
    },
}

impl Default for BodyParsing {
    fn default() -> Self {
        BodyParsing::Enabled(true)
    }
}

impl BodyParsing {
    pub fn body_parser(&self) -> bool {
        match *self {
            BodyParsing::Enabled(on) => on,
            BodyParsing::Detailed { body_parser, .. } => body_parser,
        }
    }

    pub fn multipart_parser(&self) -> bool {
        match *self {
            BodyParsing::Enabled(on) => on,
            BodyParsing::Detailed { multipart_parser, .. } => multipart_parser,
        }
    }

    pub fn cookie_parser(&self) -> bool {
        match *self {
            BodyParsing::Enabled(on) => on,
            BodyParsing::Detailed { cookie_parser, .. } => cookie_parser,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub body_parsing: BodyParsing,

    /// Treat every chain as possibly suspending
    /// Env: REX_FORCE_ASYNC
    /// Default: false
    pub force_async: bool,

    /// JSON instead of HTML for the default error and not-found responses
    /// Env: REX_PREFER_JSON
    /// Default: false
    pub prefer_json_errors: bool,

    /// Files above this size (bytes) are streamed
    /// Env: REX_MAX_INLINE_FILE_SIZE
    /// Default: 102400
    pub max_inline_file_size: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            body_parsing: BodyParsing::default(),
            force_async: false,
            prefer_json_errors: false,
            max_inline_file_size: DEFAULT_MAX_INLINE_FILE_SIZE,
        }
    }
}

impl DispatchConfig {
    pub fn apply_env_vars(&mut self) {
        if let Ok(enabled) = env::var("REX_FORCE_ASYNC") {
            self.force_async = enabled.parse().unwrap_or(false);
        }

        if let Ok(enabled) = env::var("REX_PREFER_JSON") {
            self.prefer_json_errors = enabled.parse().unwrap_or(false);
        }

        if let Ok(size) = env::var("REX_MAX_INLINE_FILE_SIZE") {
            if let Ok(s) = size.parse() {
                self.max_inline_file_size = s;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_inline_file_size == 0 {
            bail!("Invalid max_inline_file_size: must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_parsing_forms() {
        let all: BodyParsing = serde_json::from_str("false").unwrap();
        assert_eq!(all, BodyParsing::Enabled(false));
        assert!(!all.cookie_parser());

        let detailed: BodyParsing =
            serde_json::from_str(r#"{"body_parser": true, "cookie_parser": true}"#).unwrap();
        assert!(detailed.body_parser());
        assert!(!detailed.multipart_parser());
        assert!(detailed.cookie_parser());
    }

    #[test]
    fn test_zero_inline_size_fails() {
        let cfg = DispatchConfig { max_inline_file_size: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
