//! HTTP vocabulary shared by the router, the request/response facades and the
//! transport binding.
//!
//! # Architecture
//!
//! - [`HttpMethod`] - the fixed method enumeration routes are registered under
//! - [`status`] - reason phrases and status lines
//! - [`connection`] - the transport contract ([`HttpConnection`]) and the
//!   request head delivered with every connection event

pub mod connection;
pub mod status;

pub use connection::{HttpConnection, RequestHead};
pub use status::{reason_phrase, status_line};

use std::str::FromStr;

use crate::error::RexError;

/// HTTP methods a route can be registered under.
///
/// `ANY` matches every method and is only consulted after the method-specific
/// routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    OPTIONS,
    CONNECT,
    TRACE,
    ANY,
}

impl HttpMethod {
    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::CONNECT => "CONNECT",
            HttpMethod::TRACE => "TRACE",
            HttpMethod::ANY => "ANY",
        }
    }

    /// Methods whose requests carry a body the dispatcher drains before the chain runs
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::POST | HttpMethod::PUT | HttpMethod::PATCH)
    }
}

impl FromStr for HttpMethod {
    type Err = RexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::GET),
            "POST" => Ok(HttpMethod::POST),
            "PUT" => Ok(HttpMethod::PUT),
            "PATCH" => Ok(HttpMethod::PATCH),
            "DELETE" | "DEL" => Ok(HttpMethod::DELETE),
            "HEAD" => Ok(HttpMethod::HEAD),
            "OPTIONS" => Ok(HttpMethod::OPTIONS),
            "CONNECT" => Ok(HttpMethod::CONNECT),
            "TRACE" => Ok(HttpMethod::TRACE),
            "ANY" | "ALL" => Ok(HttpMethod::ANY),
            _ => Err(RexError::InvalidArgument(format!("unsupported HTTP method: {}", s))),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Common header names, lower-cased the way the response writer stores them
pub mod headers {
    pub const CONTENT_TYPE: &str = "content-type";
    pub const CONTENT_DISPOSITION: &str = "content-disposition";
    pub const CACHE_CONTROL: &str = "cache-control";
    pub const LAST_MODIFIED: &str = "last-modified";
    pub const LOCATION: &str = "location";
    pub const SET_COOKIE: &str = "set-cookie";
    pub const COOKIE: &str = "cookie";
    pub const HOST: &str = "host";
    pub const REFERER: &str = "referer";
    pub const REFERRER: &str = "referrer";
    pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
    pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
}

/// Common content types
pub mod content_types {
    pub const JSON: &str = "application/json; charset=utf-8";
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const TEXT: &str = "text/plain; charset=utf-8";
    pub const OCTET: &str = "application/octet-stream";
}
