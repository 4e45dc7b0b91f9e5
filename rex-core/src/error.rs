//! Error types for the framework itself.
//!
//! Errors raised *inside* a middleware chain are [`HandlerError`]s
//! (`anyhow::Error`), so handlers can forward anything they like. `RexError`
//! covers what the framework reports on its own: malformed route templates,
//! invalid arguments, header misuse, transport failures.
//!
//! [`HandlerError`]: crate::middleware::HandlerError

use thiserror::Error;

/// Result type used across rex-core
pub type Result<T> = std::result::Result<T, RexError>;

/// Framework error
#[derive(Debug, Error)]
pub enum RexError {
    /// A route template could not be compiled. Fatal at startup.
    #[error("invalid route template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A header was set in a way HTTP does not allow (e.g. a multi-valued Content-Type)
    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Server(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl RexError {
    pub(crate) fn invalid_template(template: &str, reason: impl Into<String>) -> Self {
        RexError::InvalidTemplate { template: template.to_string(), reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RexError::invalid_template("/user/:", "empty parameter name");
        assert_eq!(err.to_string(), "invalid route template `/user/:`: empty parameter name");

        let err = RexError::InvalidHeader {
            name: "content-type".to_string(),
            reason: "cannot be set to multiple values".to_string(),
        };
        assert!(err.to_string().contains("content-type"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RexError = io.into();
        assert!(matches!(err, RexError::Io(_)));
    }
}
