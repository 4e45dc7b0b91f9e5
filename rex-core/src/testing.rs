//! Test doubles for the transport and a socket-free client.
//!
//! [`MockConnection`] is a scripted [`HttpConnection`]: clones share the same
//! state, so a test keeps one handle while the dispatcher owns the other.
//! [`TestClient`] drives a built [`App`] through it.

use std::cell::{Cell, Ref, RefCell};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::app::App;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::http::{HttpConnection, RequestHead};
use crate::response::ByteSource;

/// Everything a [`MockConnection`] saw
#[derive(Debug, Default)]
pub struct MockState {
    pub status: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub ended: bool,
    pub end_calls: usize,
    pub write_offset: u64,
    pub aborted: bool,
    pub cork_calls: usize,
    pub try_end_calls: usize,
    /// Writes attempted after the abort flag was set
    pub writes_after_abort: usize,
    accept_limits: VecDeque<usize>,
    request_chunks: VecDeque<Bytes>,
    abort_on_writable: bool,
    remote_addr: Option<SocketAddr>,
}

impl MockState {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    state: Rc<RefCell<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_addr(self, addr: SocketAddr) -> Self {
        self.state.borrow_mut().remote_addr = Some(addr);
        self
    }

    /// Bytes accepted by each upcoming `try_end`, in order; unlimited once exhausted
    pub fn accept_limits(&self, limits: &[usize]) {
        self.state.borrow_mut().accept_limits.extend(limits.iter().copied());
    }

    /// Queue a chunk of request body
    pub fn push_request_chunk(&self, chunk: &[u8]) {
        self.state.borrow_mut().request_chunks.push_back(Bytes::copy_from_slice(chunk));
    }

    /// Peer disconnect
    pub fn abort(&self) {
        self.state.borrow_mut().aborted = true;
    }

    /// Disconnect the next time someone waits for the connection to drain
    pub fn abort_on_writable(&self) {
        self.state.borrow_mut().abort_on_writable = true;
    }

    pub fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    /// Record a write; false when the peer is gone
    fn writing(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.aborted {
            state.writes_after_abort += 1;
            return false;
        }
        true
    }
}

#[async_trait(?Send)]
impl HttpConnection for MockConnection {
    fn write_status(&mut self, status: &str) {
        if self.writing() {
            self.state.borrow_mut().status = Some(status.to_string());
        }
    }

    fn write_header(&mut self, name: &str, value: &str) {
        if self.writing() {
            self.state.borrow_mut().headers.push((name.to_string(), value.to_string()));
        }
    }

    fn end(&mut self, body: Bytes) {
        if !self.writing() {
            return;
        }
        let mut state = self.state.borrow_mut();
        state.write_offset += body.len() as u64;
        state.body.extend_from_slice(&body);
        state.ended = true;
        state.end_calls += 1;
    }

    fn try_end(&mut self, chunk: Bytes, total_size: u64) -> (bool, bool) {
        self.state.borrow_mut().try_end_calls += 1;
        if !self.writing() {
            return (false, false);
        }

        let mut state = self.state.borrow_mut();
        let limit = state.accept_limits.pop_front().unwrap_or(usize::MAX);
        let taken = limit.min(chunk.len());
        state.body.extend_from_slice(&chunk[..taken]);
        state.write_offset += taken as u64;

        let done = state.write_offset >= total_size;
        if done {
            state.ended = true;
            state.end_calls += 1;
        }
        (taken == chunk.len(), done)
    }

    fn write_offset(&self) -> u64 {
        self.state.borrow().write_offset
    }

    fn is_aborted(&self) -> bool {
        self.state.borrow().aborted
    }

    fn cork(&mut self, f: &mut dyn FnMut(&mut dyn HttpConnection)) {
        self.state.borrow_mut().cork_calls += 1;
        f(self);
    }

    async fn writable(&mut self) -> Option<u64> {
        let mut state = self.state.borrow_mut();
        if state.abort_on_writable {
            state.aborted = true;
        }
        if state.aborted {
            return None;
        }
        Some(state.write_offset)
    }

    async fn read_chunk(&mut self) -> Option<Bytes> {
        let mut state = self.state.borrow_mut();
        if state.aborted {
            return None;
        }
        state.request_chunks.pop_front()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.state.borrow().remote_addr
    }
}

/// Observes a [`VecByteSource`] after it was handed over
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    destroyed: Rc<Cell<usize>>,
    paused: Rc<Cell<bool>>,
}

impl SourceProbe {
    /// Times `destroy` was called
    pub fn destroyed(&self) -> usize {
        self.destroyed.get()
    }

    pub fn paused(&self) -> bool {
        self.paused.get()
    }
}

/// In-memory [`ByteSource`] yielding preset chunks
#[derive(Debug)]
pub struct VecByteSource {
    chunks: VecDeque<Bytes>,
    fail_when_empty: bool,
    probe: SourceProbe,
}

impl VecByteSource {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self { chunks: chunks.into(), fail_when_empty: false, probe: SourceProbe::default() }
    }

    /// A source that errors instead of ending
    pub fn failing(chunks: Vec<Bytes>) -> Self {
        Self { fail_when_empty: true, ..Self::new(chunks) }
    }

    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }
}

#[async_trait(?Send)]
impl ByteSource for VecByteSource {
    async fn read_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
        match self.chunks.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.fail_when_empty && self.probe.destroyed() == 0 => {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "source failed"))
            }
            None => Ok(None),
        }
    }

    fn pause(&mut self) {
        self.probe.paused.set(true);
    }

    fn resume(&mut self) {
        self.probe.paused.set(false);
    }

    fn is_paused(&self) -> bool {
        self.probe.paused.get()
    }

    fn destroy(&mut self) {
        self.chunks.clear();
        self.probe.destroyed.set(self.probe.destroyed.get() + 1);
    }
}

/// What a [`TestClient`] request produced
#[derive(Debug, Clone)]
pub struct TestResponse {
    /// 0 when nothing was written
    pub status: u16,
    pub status_line: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TestResponse {
    fn from_state(state: &MockState) -> Self {
        let status = state
            .status
            .as_deref()
            .and_then(|line| line.split_whitespace().next())
            .and_then(|code| code.parse().ok())
            .unwrap_or(0);
        Self {
            status,
            status_line: state.status.clone(),
            headers: state.headers.clone(),
            body: state.body.clone(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }

    /// First value of a header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }
}

/// Runs requests through a built app without opening sockets
pub struct TestClient {
    dispatcher: Dispatcher,
}

impl TestClient {
    pub fn new(app: App) -> Result<Self> {
        Ok(Self { dispatcher: app.build()? })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Dispatch `head` with an optional body over a fresh [`MockConnection`]
    pub async fn request(&self, head: RequestHead, body: Option<&[u8]>) -> TestResponse {
        self.request_on(MockConnection::new(), head, body).await
    }

    /// Dispatch over a caller-prepared connection (accept limits, aborts)
    pub async fn request_on(
        &self,
        conn: MockConnection,
        head: RequestHead,
        body: Option<&[u8]>,
    ) -> TestResponse {
        if let Some(body) = body {
            conn.push_request_chunk(body);
        }
        self.dispatcher.handle(Box::new(conn.clone()), head).await;
        let state = conn.state();
        TestResponse::from_state(&state)
    }

    pub async fn get(&self, target: &str) -> TestResponse {
        self.request(RequestHead::new("GET", target), None).await
    }

    pub async fn post(&self, target: &str, content_type: &str, body: &[u8]) -> TestResponse {
        let head = RequestHead::new("POST", target).with_header("content-type", content_type);
        self.request(head, Some(body)).await
    }
}
