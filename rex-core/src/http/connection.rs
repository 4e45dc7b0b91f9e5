//! Transport contract.
//!
//! The dispatcher never touches sockets. Every connection event arrives as a
//! [`RequestHead`] plus a boxed [`HttpConnection`], the handful of outbound
//! primitives an event-driven server exposes: buffered status/header writes,
//! a terminal `end`, a partial `try_end` that reports backpressure, the
//! current write offset, a writable-resumption point and a scoped flush
//! (`cork`). [`crate::server::HyperConnection`] binds it to hyper;
//! [`crate::testing::MockConnection`] scripts it for tests.

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;

/// Method, target and headers of an incoming request, available before the body
#[derive(Debug, Clone, Default)]
pub struct RequestHead {
    /// Raw method as sent by the client
    pub method: String,
    /// Path without the query string
    pub url: String,
    /// Raw query string, without the leading `?`
    pub query: String,
    /// Header pairs, names lower-cased
    pub headers: Vec<(String, String)>,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestHead {
    /// Build a head from a method and a request target (`/path?query`)
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (url, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (target.to_string(), String::new()),
        };
        let url = if url.is_empty() { "/".to_string() } else { url };

        Self { method: method.into(), url, query, headers: Vec::new(), remote_addr: None }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// First value of a header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Outbound primitives of one HTTP exchange.
///
/// Implementations must make every write a no-op once the peer is gone;
/// callers still check [`is_aborted`](HttpConnection::is_aborted) first.
#[async_trait(?Send)]
pub trait HttpConnection {
    /// Write the status line value (`"200 OK"`). Must precede headers and body.
    fn write_status(&mut self, status: &str);

    fn write_header(&mut self, name: &str, value: &str);

    /// Terminal write; the exchange is complete afterwards
    fn end(&mut self, body: Bytes);

    /// Attempt a partial write of `chunk` of a response totalling `total_size` bytes.
    ///
    /// Returns `(accepted, done)`: `accepted` is false when the outbound buffer
    /// could not take the whole chunk (the write offset tells how much it did
    /// take), `done` is true once `total_size` bytes have been written.
    fn try_end(&mut self, chunk: Bytes, total_size: u64) -> (bool, bool);

    /// Bytes of body written so far
    fn write_offset(&self) -> u64;

    fn is_aborted(&self) -> bool;

    /// Run `f` as one flush: status, headers and body leave together.
    fn cork(&mut self, f: &mut dyn FnMut(&mut dyn HttpConnection));

    /// Resolve once the outbound buffer drained, with the current write offset.
    /// `None` means the peer went away while waiting.
    async fn writable(&mut self) -> Option<u64>;

    /// Next chunk of the request body, `None` at the end (or on abort)
    async fn read_chunk(&mut self) -> Option<Bytes>;

    fn remote_addr(&self) -> Option<SocketAddr>;
}
