//! Request facade.
//!
//! A [`Request`] wraps the [`RequestHead`] the transport delivered plus the
//! positional parameter values the route table extracted. Every derived view
//! (header map, query map, params, cookies, original URL) is computed on first
//! access and cached for the rest of the request.

mod body;
mod negotiation;

pub use body::{Body, Part, UploadedFile};

use std::cell::OnceCell;
use std::collections::HashMap;
use std::net::IpAddr;

use bytes::Bytes;

use crate::error::{Result, RexError};
use crate::http::{headers, HttpMethod, RequestHead};

/// Per-request data the dispatcher hands to [`Request::new`]
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Names from the matched route, index-aligned with `parameter_values`
    pub parameter_names: Vec<String>,
    pub parameter_values: Vec<String>,
    /// Populate [`Request::cookies`]
    pub cookie_parsing: bool,
    /// Mount prefix of the matched route
    pub base_url: Option<String>,
}

/// One in-flight request
#[derive(Debug)]
pub struct Request {
    head: RequestHead,
    method: HttpMethod,
    options: RequestOptions,
    raw: Option<Bytes>,
    body: Option<Body>,
    headers: OnceCell<HashMap<String, String>>,
    query: OnceCell<HashMap<String, String>>,
    params: OnceCell<HashMap<String, String>>,
    cookies: OnceCell<HashMap<String, String>>,
    original_url: OnceCell<String>,
}

impl Request {
    pub fn new(head: RequestHead, options: RequestOptions) -> Self {
        let method = head.method.parse().unwrap_or(HttpMethod::ANY);
        Self {
            head,
            method,
            options,
            raw: None,
            body: None,
            headers: OnceCell::new(),
            query: OnceCell::new(),
            params: OnceCell::new(),
            cookies: OnceCell::new(),
            original_url: OnceCell::new(),
        }
    }

    /// Method of the request; methods outside the enumeration read as `ANY`
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Method exactly as the client sent it
    pub fn method_str(&self) -> &str {
        &self.head.method
    }

    /// Full request path, without the query string
    pub fn url(&self) -> &str {
        &self.head.url
    }

    pub fn query_string(&self) -> &str {
        &self.head.query
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    /// Headers keyed by lower-case name. Repeated headers are joined with
    /// `", "`, except `cookie` which joins with `"; "`.
    pub fn headers(&self) -> &HashMap<String, String> {
        self.headers.get_or_init(|| {
            let mut map: HashMap<String, String> = HashMap::new();
            for (name, value) in &self.head.headers {
                let name = name.to_ascii_lowercase();
                let separator = if name == headers::COOKIE { "; " } else { ", " };
                map.entry(name)
                    .and_modify(|existing| {
                        existing.push_str(separator);
                        existing.push_str(value);
                    })
                    .or_insert_with(|| value.clone());
            }
            map
        })
    }

    /// Case-insensitive header lookup. `Referer` and `Referrer` are aliases.
    ///
    /// Fails with [`RexError::InvalidArgument`] when `name` is empty.
    pub fn get(&self, name: &str) -> Result<Option<&str>> {
        if name.is_empty() {
            return Err(RexError::InvalidArgument("header name is required".to_string()));
        }

        let name = name.to_ascii_lowercase();
        let headers = self.headers();
        let value = match name.as_str() {
            headers::REFERER | headers::REFERRER => {
                headers.get(headers::REFERRER).or_else(|| headers.get(headers::REFERER))
            }
            _ => headers.get(&name),
        };
        Ok(value.map(String::as_str))
    }

    /// Alias of [`get`](Request::get)
    pub fn header(&self, name: &str) -> Result<Option<&str>> {
        self.get(name)
    }

    /// Decoded query string; the last value of a repeated key wins
    pub fn query(&self) -> &HashMap<String, String> {
        self.query.get_or_init(|| parse_query(&self.head.query))
    }

    /// Route parameters by name, empty when the route has none
    pub fn params(&self) -> &HashMap<String, String> {
        self.params.get_or_init(|| {
            self.options
                .parameter_names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    self.options.parameter_values.get(i).map(|value| (name.clone(), value.clone()))
                })
                .collect()
        })
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params().get(name).map(String::as_str)
    }

    /// Parsed `Cookie` header, `None` when cookie parsing is disabled.
    ///
    /// Pairs that do not split into exactly one name and one value are dropped.
    pub fn cookies(&self) -> Option<&HashMap<String, String>> {
        if !self.options.cookie_parsing {
            return None;
        }

        Some(self.cookies.get_or_init(|| {
            let Some(header) = self.headers().get(headers::COOKIE) else {
                return HashMap::new();
            };
            header
                .split(';')
                .filter_map(|pair| {
                    let pieces: Vec<&str> = pair.trim().split('=').collect();
                    match pieces.as_slice() {
                        [name, value] => Some((name.to_string(), value.to_string())),
                        _ => None,
                    }
                })
                .collect()
        }))
    }

    /// Raw body bytes, when the method carries a body and the client sent one
    pub fn raw(&self) -> Option<&Bytes> {
        self.raw.as_ref()
    }

    pub fn set_raw(&mut self, raw: Option<Bytes>) {
        self.raw = raw;
    }

    /// Body as set by a body parser
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = Some(body);
    }

    /// First of `types` matching the request's content type.
    ///
    /// `types` may hold essences (`application/json`), wildcards (`text/*`) or
    /// extensions (`json`). Returns `None` when there is no body, no content
    /// type, or no match.
    pub fn is(&self, types: &[&str]) -> Option<String> {
        self.raw.as_ref()?;
        let content_type = self.headers().get(headers::CONTENT_TYPE)?;
        let actual = negotiation::normalize_type(content_type)?;

        types
            .iter()
            .find(|candidate| {
                negotiation::normalize_type(candidate)
                    .is_some_and(|pattern| negotiation::mime_matches(&actual, &pattern))
            })
            .map(|candidate| candidate.to_string())
    }

    /// First offered media type allowed by `Accept`
    pub fn accepts(&self, types: &[&str]) -> Option<String> {
        negotiation::accepts_type(self.header_value("accept"), types)
    }

    pub fn accepts_charsets(&self, charsets: &[&str]) -> Option<String> {
        negotiation::accepts_token(self.header_value("accept-charset"), charsets, false)
    }

    pub fn accepts_encodings(&self, encodings: &[&str]) -> Option<String> {
        negotiation::accepts_token(self.header_value("accept-encoding"), encodings, false)
    }

    pub fn accepts_languages(&self, languages: &[&str]) -> Option<String> {
        negotiation::accepts_token(self.header_value("accept-language"), languages, true)
    }

    /// Address of the peer socket
    pub fn ip(&self) -> Option<IpAddr> {
        self.head.remote_addr.map(|addr| addr.ip())
    }

    /// `X-Forwarded-For` entries followed by the peer address
    pub fn ips(&self) -> Vec<String> {
        let mut ips: Vec<String> = self
            .header_value(headers::X_FORWARDED_FOR)
            .map(|fwd| {
                fwd.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
            })
            .unwrap_or_default();
        if let Some(ip) = self.ip() {
            ips.push(ip.to_string());
        }
        ips
    }

    /// Host name from `X-Forwarded-Host` (first value) or `Host`, without the port
    pub fn hostname(&self) -> Option<String> {
        let host = self
            .header_value(headers::X_FORWARDED_HOST)
            .and_then(|fwd| fwd.split(',').next())
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .or_else(|| self.header_value(headers::HOST))?;

        let hostname = if host.starts_with('[') {
            // IPv6 literal: keep the brackets, drop whatever follows `]`
            match host.find(']') {
                Some(end) => &host[..=end],
                None => host,
            }
        } else {
            host.split(':').next().unwrap_or(host)
        };
        Some(hostname.to_string())
    }

    /// Mount prefix of the matched route
    pub fn base_url(&self) -> Option<&str> {
        self.options.base_url.as_deref()
    }

    /// URL relative to the mount prefix; the full URL when the route was not mounted
    pub fn original_url(&self) -> &str {
        self.original_url.get_or_init(|| match self.base_url() {
            Some(base) if !base.is_empty() => {
                let stripped = self.head.url.replacen(base, "", 1);
                if stripped.is_empty() {
                    "/".to_string()
                } else {
                    stripped
                }
            }
            _ => self.head.url.clone(),
        })
    }

    fn header_value(&self, name: &str) -> Option<&str> {
        self.headers().get(name).map(String::as_str)
    }
}

/// Split `a=1&b=two+words` into a map, percent-decoding names and values
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(name), decode_component(value))
        })
        .collect()
}

fn decode_component(value: &str) -> String {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced).map(|s| s.into_owned()).unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(head: RequestHead) -> Request {
        Request::new(head, RequestOptions::default())
    }

    #[test]
    fn test_params_from_positional_values() {
        let req = Request::new(
            RequestHead::new("GET", "/user/42"),
            RequestOptions {
                parameter_names: vec!["id".to_string()],
                parameter_values: vec!["42".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(req.params().len(), 1);

        let req = request(RequestHead::new("GET", "/"));
        assert!(req.params().is_empty());
    }

    #[test]
    fn test_get_is_case_insensitive_with_referrer_alias() {
        let req = request(
            RequestHead::new("GET", "/")
                .with_header("Content-Type", "text/plain")
                .with_header("Referer", "http://example.com/page"),
        );
        assert_eq!(req.get("content-type").unwrap(), Some("text/plain"));
        assert_eq!(req.get("CONTENT-TYPE").unwrap(), Some("text/plain"));
        assert_eq!(req.get("referrer").unwrap(), Some("http://example.com/page"));
        assert_eq!(req.get("Referer").unwrap(), Some("http://example.com/page"));
        assert_eq!(req.get("x-missing").unwrap(), None);
    }

    #[test]
    fn test_get_rejects_empty_name() {
        let req = request(RequestHead::new("GET", "/"));
        assert!(matches!(req.get(""), Err(RexError::InvalidArgument(_))));
    }

    #[test]
    fn test_headers_are_memoized() {
        let req = request(RequestHead::new("GET", "/").with_header("x-a", "1"));
        let first = req.headers() as *const _;
        let second = req.headers() as *const _;
        assert_eq!(first, second);
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let req = request(
            RequestHead::new("GET", "/").with_header("accept", "text/html").with_header("Accept", "*/*"),
        );
        assert_eq!(req.get("accept").unwrap(), Some("text/html, */*"));
    }

    #[test]
    fn test_query_parsing() {
        let req = request(RequestHead::new("GET", "/search?q=rust+lang&page=2&q2=a%26b&flag"));
        assert_eq!(req.query()["q"], "rust lang");
        assert_eq!(req.query()["page"], "2");
        assert_eq!(req.query()["q2"], "a&b");
        assert_eq!(req.query()["flag"], "");
        assert_eq!(req.url(), "/search");
    }

    #[test]
    fn test_cookie_parsing() {
        let head = RequestHead::new("GET", "/").with_header("cookie", "a=1; b=2; c; d=x=y");
        let req = Request::new(
            head.clone(),
            RequestOptions { cookie_parsing: true, ..Default::default() },
        );
        let cookies = req.cookies().unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["a"], "1");
        assert_eq!(cookies["b"], "2");

        let req = request(head);
        assert!(req.cookies().is_none());
    }

    #[test]
    fn test_repeated_cookie_headers() {
        let head = RequestHead::new("GET", "/").with_header("Cookie", "a=1").with_header("cookie", "b=2");
        let req = Request::new(head, RequestOptions { cookie_parsing: true, ..Default::default() });
        assert_eq!(req.get("cookie").unwrap(), Some("a=1; b=2"));

        let cookies = req.cookies().unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["a"], "1");
        assert_eq!(cookies["b"], "2");
    }

    #[test]
    fn test_cookies_without_header() {
        let req = Request::new(
            RequestHead::new("GET", "/"),
            RequestOptions { cookie_parsing: true, ..Default::default() },
        );
        assert!(req.cookies().unwrap().is_empty());
    }

    #[test]
    fn test_is_content_type() {
        let mut req = request(
            RequestHead::new("POST", "/").with_header("content-type", "application/json; charset=utf-8"),
        );
        assert_eq!(req.is(&["json"]), None);

        req.set_raw(Some(Bytes::from_static(b"{}")));
        assert_eq!(req.is(&["html", "json"]).as_deref(), Some("json"));
        assert_eq!(req.is(&["application/*"]).as_deref(), Some("application/*"));
        assert_eq!(req.is(&["text/*"]), None);
    }

    #[test]
    fn test_hostname() {
        let req = request(RequestHead::new("GET", "/").with_header("host", "example.com:8080"));
        assert_eq!(req.hostname().as_deref(), Some("example.com"));

        let req = request(
            RequestHead::new("GET", "/")
                .with_header("host", "internal:80")
                .with_header("x-forwarded-host", "public.example, proxy.example"),
        );
        assert_eq!(req.hostname().as_deref(), Some("public.example"));

        let req = request(RequestHead::new("GET", "/").with_header("host", "[::1]:3000"));
        assert_eq!(req.hostname().as_deref(), Some("[::1]"));

        let req = request(RequestHead::new("GET", "/"));
        assert_eq!(req.hostname(), None);
    }

    #[test]
    fn test_ip_and_ips() {
        let addr: std::net::SocketAddr = "10.0.0.5:5555".parse().unwrap();
        let req = request(
            RequestHead::new("GET", "/")
                .with_remote_addr(addr)
                .with_header("x-forwarded-for", "203.0.113.7, 198.51.100.2"),
        );
        assert_eq!(req.ip(), Some(addr.ip()));
        assert_eq!(req.ips(), vec!["203.0.113.7", "198.51.100.2", "10.0.0.5"]);
    }

    #[test]
    fn test_base_and_original_url() {
        let req = Request::new(
            RequestHead::new("GET", "/api/users/7"),
            RequestOptions { base_url: Some("/api".to_string()), ..Default::default() },
        );
        assert_eq!(req.base_url(), Some("/api"));
        assert_eq!(req.url(), "/api/users/7");
        assert_eq!(req.original_url(), "/users/7");

        let req = request(RequestHead::new("GET", "/plain"));
        assert_eq!(req.original_url(), "/plain");
    }

    #[test]
    fn test_unknown_method_reads_as_any() {
        let req = request(RequestHead::new("BREW", "/pot"));
        assert_eq!(req.method(), HttpMethod::ANY);
        assert_eq!(req.method_str(), "BREW");
    }
}
