//! Application logger
//!
//! [`Logger`] is the per-application, channel-filtered front end handlers
//! get from [`App::logger`](crate::App::logger). It writes through the `log`
//! facade (target `rex`), so the backend installed by [`init_logging`], or
//! any other `log` backend, decides where lines go.
//!
//! ```rust,ignore
//! let logger = Logger::new(&LoggingConfig::default());
//! logger.warn("disk almost full");     // printed: warn is on by default
//! logger.info("request served");       // silent: info is off by default
//! logger.deprecate("use `all` instead");
//! ```

use std::fmt::Display;
use std::sync::Once;

use crate::config::{LogChannels, LoggingConfig};

const TARGET: &str = "rex";

static INIT: Once = Once::new();

/// Install an `env_logger` backend once. `RUST_LOG` wins over `config.level`.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or(config.level.as_str());
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .format_module_path(false)
            .try_init();
    });
}

/// Logger channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Error,
    Warn,
    Info,
    Log,
    Trace,
    Deprecate,
}

impl Channel {
    const ALL: [Channel; 6] = [
        Channel::Error,
        Channel::Warn,
        Channel::Info,
        Channel::Log,
        Channel::Trace,
        Channel::Deprecate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Error => "error",
            Channel::Warn => "warn",
            Channel::Info => "info",
            Channel::Log => "log",
            Channel::Trace => "trace",
            Channel::Deprecate => "deprecate",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Logger {
    prefix: String,
    enabled: Vec<Channel>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(&LoggingConfig::default())
    }
}

impl Logger {
    pub fn new(config: &LoggingConfig) -> Self {
        let enabled = match &config.channels {
            LogChannels::All(true) => Channel::ALL.to_vec(),
            LogChannels::All(false) => Vec::new(),
            LogChannels::Only(names) => Channel::ALL
                .into_iter()
                .filter(|channel| names.iter().any(|name| name.eq_ignore_ascii_case(channel.as_str())))
                .collect(),
        };
        Self { prefix: config.prefix.clone(), enabled }
    }

    /// A logger with every channel off; `print` still prints
    pub fn silent() -> Self {
        Self { prefix: String::new(), enabled: Vec::new() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.enabled.contains(&channel)
    }

    pub fn error(&self, message: impl Display) {
        if self.is_enabled(Channel::Error) {
            log::error!(target: TARGET, "{}", self.line(message));
        }
    }

    pub fn warn(&self, message: impl Display) {
        if self.is_enabled(Channel::Warn) {
            log::warn!(target: TARGET, "{}", self.line(message));
        }
    }

    pub fn info(&self, message: impl Display) {
        if self.is_enabled(Channel::Info) {
            log::info!(target: TARGET, "{}", self.line(message));
        }
    }

    pub fn log(&self, message: impl Display) {
        if self.is_enabled(Channel::Log) {
            log::info!(target: TARGET, "{}", self.line(message));
        }
    }

    pub fn trace(&self, message: impl Display) {
        if self.is_enabled(Channel::Trace) {
            log::trace!(target: TARGET, "{}", self.line(message));
        }
    }

    /// Warn-level, prefixed with `[DEPRECATED]`
    pub fn deprecate(&self, message: impl Display) {
        if self.is_enabled(Channel::Deprecate) {
            log::warn!(target: TARGET, "{}", self.line(format_args!("[DEPRECATED] {}", message)));
        }
    }

    /// Always printed, whatever the channel settings
    pub fn print(&self, message: impl Display) {
        log::info!(target: TARGET, "{}", self.line(message));
    }

    fn line(&self, message: impl Display) -> String {
        if self.prefix.is_empty() {
            message.to_string()
        } else {
            format!("{} {}", self.prefix, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_channels() {
        let logger = Logger::default();
        assert!(logger.is_enabled(Channel::Error));
        assert!(logger.is_enabled(Channel::Warn));
        assert!(logger.is_enabled(Channel::Deprecate));
        assert!(!logger.is_enabled(Channel::Info));
        assert_eq!(logger.prefix(), "[ReX]");
    }

    #[test]
    fn test_all_and_none() {
        let config = LoggingConfig { channels: LogChannels::All(true), ..Default::default() };
        let logger = Logger::new(&config);
        assert!(Channel::ALL.iter().all(|c| logger.is_enabled(*c)));

        let config = LoggingConfig { channels: LogChannels::All(false), ..Default::default() };
        let logger = Logger::new(&config);
        assert!(Channel::ALL.iter().all(|c| !logger.is_enabled(*c)));
    }

    #[test]
    fn test_line_prefix() {
        let logger = Logger::default();
        assert_eq!(logger.line("hello"), "[ReX] hello");
        assert_eq!(Logger::silent().line("hello"), "hello");
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(&LoggingConfig::default());
        init_logging(&LoggingConfig::default());
        Logger::default().print("still fine");
    }
}
