//! `Set-Cookie` serialization for `res.cookie()` / `res.clear_cookie()`

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::error::{Result, RexError};

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// SameSite policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// Cookie attributes
#[derive(Debug, Clone, Default)]
pub struct CookieOptions {
    pub domain: Option<String>,

    /// Defaults to `/`
    pub path: Option<String>,

    /// Lifetime in **milliseconds**; sets both `Expires` and `Max-Age` (in seconds)
    pub max_age: Option<i64>,

    /// Explicit expiry, overridden by `max_age`
    pub expires: Option<DateTime<Utc>>,

    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

/// A cookie value. JSON values are stored as `j:` + their JSON text.
#[derive(Debug, Clone, PartialEq)]
pub enum CookieValue {
    Text(String),
    Json(Value),
}

impl CookieValue {
    fn encoded(&self) -> String {
        match self {
            CookieValue::Text(text) => text.clone(),
            CookieValue::Json(value) => format!("j:{}", value),
        }
    }
}

impl From<&str> for CookieValue {
    fn from(value: &str) -> Self {
        CookieValue::Text(value.to_string())
    }
}

impl From<String> for CookieValue {
    fn from(value: String) -> Self {
        CookieValue::Text(value)
    }
}

impl From<Value> for CookieValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => CookieValue::Text(text),
            other => CookieValue::Json(other),
        }
    }
}

/// Build a `Set-Cookie` header value
pub fn serialize_cookie(
    name: &str,
    value: &CookieValue,
    options: &CookieOptions,
    now: DateTime<Utc>,
) -> Result<String> {
    let valid_name = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c));
    if !valid_name {
        return Err(RexError::InvalidArgument(format!("invalid cookie name: {:?}", name)));
    }

    let mut parts = vec![format!("{}={}", name, urlencoding::encode(&value.encoded()))];

    let mut expires = options.expires;
    if let Some(max_age) = options.max_age {
        expires = Some(now + Duration::milliseconds(max_age));
        parts.push(format!("Max-Age={}", max_age.div_euclid(1000)));
    }

    if let Some(ref domain) = options.domain {
        parts.push(format!("Domain={}", domain));
    }

    parts.push(format!("Path={}", options.path.as_deref().unwrap_or("/")));

    if let Some(expires) = expires {
        parts.push(format!("Expires={}", expires.format(HTTP_DATE)));
    }

    if options.http_only {
        parts.push("HttpOnly".to_string());
    }

    if options.secure {
        parts.push("Secure".to_string());
    }

    if let Some(same_site) = options.same_site {
        let same_site = match same_site {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        };
        parts.push(format!("SameSite={}", same_site));
    }

    Ok(parts.join("; "))
}

/// A `Set-Cookie` value that expires `name` immediately
pub fn clearing_cookie(name: &str, options: &CookieOptions) -> Result<String> {
    let options = CookieOptions {
        expires: Utc.timestamp_opt(0, 0).single(),
        max_age: None,
        ..options.clone()
    };
    serialize_cookie(name, &CookieValue::Text(String::new()), &options, Utc::now())
}
