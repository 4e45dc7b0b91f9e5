//! Response writer.
//!
//! Status and headers are buffered on the [`Response`] and reach the
//! connection in one go when the response ends. When the owning chain may
//! suspend (`has_async`), that final write runs inside the connection's
//! `cork` and is skipped if the peer is already gone.
//!
//! Large files are not written here: [`Response::send_file`] parks a
//! [`StreamSession`] which the dispatcher drives once the handler returns.

pub mod cookie;
pub mod stream;

pub use cookie::{CookieOptions, CookieValue, SameSite};
pub use stream::{ByteSource, FileByteSource, StreamSession, StreamState};

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, RexError};
use crate::http::{content_types, headers, reason_phrase, status_line, HttpConnection};
use crate::middleware::defaults::{escape_html, to_html};
use crate::view::ViewRenderer;

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Default threshold above which files are streamed (100 KiB)
pub const DEFAULT_MAX_INLINE_FILE_SIZE: u64 = 100 * 1024;

/// Per-response settings decided by the dispatcher
#[derive(Clone)]
pub struct ResponseOptions {
    /// Some middleware of the chain may suspend; writes go through `cork`
    pub has_async: bool,
    pub max_inline_file_size: u64,
    /// `Referer` of the request, for `location("back")`
    pub referrer: Option<String>,
    pub renderer: Option<Rc<dyn ViewRenderer>>,
    pub prefer_json: bool,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            has_async: false,
            max_inline_file_size: DEFAULT_MAX_INLINE_FILE_SIZE,
            referrer: None,
            renderer: None,
            prefer_json: false,
        }
    }
}

/// Body accepted by [`Response::send`]
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Defaults to `text/html`
    Text(String),
    /// Defaults to `application/octet-stream`
    Bytes(Bytes),
    /// Sent as JSON
    Json(Value),
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// What [`Response::send_file`] serves
pub enum FileSource {
    Path(PathBuf),
    /// In-memory content; requires [`SendFileOptions::mime`]
    Buffer(Bytes),
    /// Any byte source of a known total size, always streamed
    Stream(Box<dyn ByteSource>, u64),
}

impl From<PathBuf> for FileSource {
    fn from(path: PathBuf) -> Self {
        FileSource::Path(path)
    }
}

impl From<&Path> for FileSource {
    fn from(path: &Path) -> Self {
        FileSource::Path(path.to_path_buf())
    }
}

impl From<&str> for FileSource {
    fn from(path: &str) -> Self {
        FileSource::Path(PathBuf::from(path))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SendFileOptions {
    pub mime: Option<String>,
    /// Seconds for `Cache-Control: public, max-age=N`; no caching when unset
    pub max_age: Option<u64>,
    /// Overrides the file's modification time
    pub last_modified: Option<DateTime<Utc>>,
    /// Overrides the size from the file metadata
    pub file_size: Option<u64>,
}

type FinishHook = Box<dyn FnOnce(u16)>;

/// The outbound half of one exchange
pub struct Response {
    conn: Box<dyn HttpConnection>,
    status: Option<u16>,
    headers: Vec<(String, String)>,
    /// Per-request scratch space shared along the chain, merged into view data
    pub locals: HashMap<String, Value>,
    options: ResponseOptions,
    finished: bool,
    pending_stream: Option<StreamSession>,
    finish_hooks: Vec<FinishHook>,
}

impl Response {
    pub fn new(conn: Box<dyn HttpConnection>, options: ResponseOptions) -> Self {
        Self {
            conn,
            status: None,
            headers: Vec::new(),
            locals: HashMap::new(),
            options,
            finished: false,
            pending_stream: None,
            finish_hooks: Vec::new(),
        }
    }

    pub fn status(&mut self, code: u16) -> &mut Self {
        self.status = Some(code);
        self
    }

    /// Status to be sent, 200 unless set
    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    /// Set a header, replacing any previous value of the same name
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(key, _)| *key != name);
        self.headers.push((name, value.into()));
        self
    }

    /// Set a multi-valued header. `Content-Type` cannot hold several values.
    pub fn set_all(&mut self, name: &str, values: &[&str]) -> Result<&mut Self> {
        let name = name.to_ascii_lowercase();
        if name == headers::CONTENT_TYPE {
            return Err(RexError::InvalidHeader {
                name,
                reason: "Content-Type cannot be set to an array".to_string(),
            });
        }
        self.headers.retain(|(key, _)| *key != name);
        self.headers.extend(values.iter().map(|value| (name.clone(), value.to_string())));
        Ok(self)
    }

    pub fn set_headers<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in pairs {
            self.set(name.as_ref(), value);
        }
        self
    }

    /// Add a header entry, keeping earlier ones
    pub fn append(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// First buffered value of a header, case-insensitive
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Set `Content-Type` from a full type or an extension (`json`, `.html`)
    pub fn content_type(&mut self, value: &str) -> &mut Self {
        let value = if value.contains('/') {
            value.to_string()
        } else {
            mime_guess::from_ext(value.trim_start_matches('.'))
                .first_raw()
                .unwrap_or(content_types::OCTET)
                .to_string()
        };
        self.set(headers::CONTENT_TYPE, value)
    }

    pub fn has_async(&self) -> bool {
        self.options.has_async
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_aborted(&self) -> bool {
        self.conn.is_aborted()
    }

    /// Run `hook` with the final status once the response is written
    pub fn on_finish(&mut self, hook: impl FnOnce(u16) + 'static) -> &mut Self {
        self.finish_hooks.push(Box::new(hook));
        self
    }

    /// Write status, headers and `body`, completing the exchange
    pub fn end(&mut self, body: impl Into<Bytes>) {
        if self.finished {
            log::warn!("response already finished, ignoring end()");
            return;
        }
        self.finished = true;

        let body = body.into();
        let status = status_line(self.status_code());
        let headers = &self.headers;
        let conn = &mut self.conn;

        if self.options.has_async {
            let mut body = Some(body);
            conn.cork(&mut |conn: &mut dyn HttpConnection| {
                if conn.is_aborted() {
                    return;
                }
                if let Some(body) = body.take() {
                    write_head(conn, &status, headers);
                    conn.end(body);
                }
            });
        } else if !conn.is_aborted() {
            write_head(conn.as_mut(), &status, headers);
            conn.end(body);
        }

        self.run_finish_hooks();
    }

    /// Send a text, binary or JSON payload with a default content type
    pub fn send(&mut self, payload: impl Into<Payload>) {
        match payload.into() {
            Payload::Text(text) => {
                self.default_content_type(content_types::HTML);
                self.end(text);
            }
            Payload::Bytes(bytes) => {
                self.default_content_type(content_types::OCTET);
                self.end(bytes);
            }
            Payload::Json(value) => {
                self.default_content_type(content_types::JSON);
                self.end(value.to_string());
            }
        }
    }

    pub fn json<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<()> {
        let encoded = serde_json::to_vec(body)?;
        self.default_content_type(content_types::JSON);
        self.end(encoded);
        Ok(())
    }

    /// Respond with `code` and its reason phrase as a plain-text body
    pub fn send_status(&mut self, code: u16) {
        let phrase = reason_phrase(code);
        let body = if phrase.is_empty() { code.to_string() } else { phrase.to_string() };
        self.status(code).set(headers::CONTENT_TYPE, content_types::TEXT);
        self.end(body);
    }

    /// Set `Location`; `"back"` means the request's referrer, or `/`
    pub fn location(&mut self, url: &str) -> &mut Self {
        let target = if url == "back" {
            self.options.referrer.clone().unwrap_or_else(|| "/".to_string())
        } else {
            url.to_string()
        };
        let encoded = encode_uri(&target);
        self.set(headers::LOCATION, encoded)
    }

    pub fn redirect(&mut self, url: &str) {
        self.redirect_with(302, url);
    }

    pub fn redirect_with(&mut self, code: u16, url: &str) {
        self.location(url);
        let location = escape_html(self.get(headers::LOCATION).unwrap_or("/"));
        let body = format!(
            "<p>{}. Redirecting to <a href=\"{}\">{}</a></p>",
            reason_phrase(code),
            location,
            location
        );
        self.status(code).set(headers::CONTENT_TYPE, content_types::HTML);
        self.end(body);
    }

    /// Append a `Set-Cookie` entry
    pub fn cookie(
        &mut self,
        name: &str,
        value: impl Into<CookieValue>,
        options: &CookieOptions,
    ) -> Result<&mut Self> {
        let header = cookie::serialize_cookie(name, &value.into(), options, Utc::now())?;
        Ok(self.append(headers::SET_COOKIE, header))
    }

    /// Append a `Set-Cookie` entry that expires `name`
    pub fn clear_cookie(&mut self, name: &str, options: &CookieOptions) -> Result<&mut Self> {
        let header = cookie::clearing_cookie(name, options)?;
        Ok(self.append(headers::SET_COOKIE, header))
    }

    /// Serve a file, a buffer or a byte source.
    ///
    /// Paths up to `max_inline_file_size` bytes are read and sent at once;
    /// larger ones and byte sources are streamed with backpressure.
    pub fn send_file(&mut self, source: FileSource, options: SendFileOptions) {
        match source {
            FileSource::Buffer(data) => {
                let Some(mime) = options.mime.clone() else {
                    log::trace!("send_file on a buffer without a mime type");
                    return self.file_not_found();
                };
                self.file_headers(&mime, &options, options.last_modified);
                self.end(data);
            }
            FileSource::Path(path) => {
                let metadata = match std::fs::metadata(&path) {
                    Ok(metadata) if metadata.is_file() => metadata,
                    Ok(_) => {
                        log::trace!("send_file: {} is not a file", path.display());
                        return self.file_not_found();
                    }
                    Err(err) => {
                        log::trace!("send_file: cannot stat {}: {}", path.display(), err);
                        return self.file_not_found();
                    }
                };

                let size = options.file_size.unwrap_or(metadata.len());
                let mime = options
                    .mime
                    .clone()
                    .unwrap_or_else(|| mime_guess::from_path(&path).first_or_octet_stream().to_string());
                let modified = options
                    .last_modified
                    .or_else(|| metadata.modified().ok().map(DateTime::<Utc>::from));
                self.file_headers(&mime, &options, modified);

                if size <= self.options.max_inline_file_size {
                    match std::fs::read(&path) {
                        Ok(data) => self.end(data),
                        Err(err) => {
                            log::trace!("send_file: cannot read {}: {}", path.display(), err);
                            self.file_not_found();
                        }
                    }
                } else {
                    match FileByteSource::open(&path) {
                        Ok(source) => self.stream(Box::new(source), size),
                        Err(err) => {
                            log::trace!("send_file: cannot open {}: {}", path.display(), err);
                            self.file_not_found();
                        }
                    }
                }
            }
            FileSource::Stream(source, size) => {
                let mime = options.mime.clone().unwrap_or_else(|| content_types::OCTET.to_string());
                self.file_headers(&mime, &options, options.last_modified);
                self.stream(source, size);
            }
        }
    }

    /// Serve `path` as an attachment
    pub fn download(&mut self, path: impl AsRef<Path>, filename: Option<&str>) {
        let path = path.as_ref();
        let filename = filename
            .map(str::to_string)
            .or_else(|| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "download".to_string());
        self.set(
            headers::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename.replace('"', "\\\"")),
        );
        self.send_file(FileSource::Path(path.to_path_buf()), SendFileOptions::default());
    }

    /// Render `view` with the configured renderer; `locals` are merged under `data`
    pub fn render(&mut self, view: &str, data: &Value) {
        let Some(renderer) = self.options.renderer.clone() else {
            self.status(500).set(headers::CONTENT_TYPE, content_types::TEXT);
            self.end("Missing view render method");
            return;
        };

        let mut merged: serde_json::Map<String, Value> =
            self.locals.iter().map(|(key, value)| (key.clone(), value.clone())).collect();
        match data {
            Value::Object(fields) => merged.extend(fields.clone()),
            Value::Null => {}
            other => {
                merged.insert("data".to_string(), other.clone());
            }
        }

        match renderer.render(view, &Value::Object(merged)) {
            Ok(html) => {
                self.default_content_type(content_types::HTML);
                self.end(html);
            }
            Err(err) => {
                log::error!("failed to render view {}: {:#}", view, err);
                self.status(500);
                if self.options.prefer_json {
                    self.set(headers::CONTENT_TYPE, content_types::JSON);
                    self.end(serde_json::json!({ "err": err.to_string() }).to_string());
                } else {
                    self.set(headers::CONTENT_TYPE, content_types::HTML);
                    self.end(to_html(&format!("{:?}", err), "Internal Server Error"));
                }
            }
        }
    }

    fn default_content_type(&mut self, value: &str) {
        if self.get(headers::CONTENT_TYPE).is_none() {
            self.set(headers::CONTENT_TYPE, value);
        }
    }

    fn file_headers(&mut self, mime: &str, options: &SendFileOptions, modified: Option<DateTime<Utc>>) {
        self.default_content_type(mime);
        if self.get(headers::CONTENT_DISPOSITION).is_some() {
            return;
        }
        if let Some(modified) = modified {
            self.set(headers::LAST_MODIFIED, modified.format(HTTP_DATE).to_string());
        }
        let cache_control = match options.max_age {
            Some(seconds) => format!("public, max-age={}", seconds),
            None => "no-cache, no-store, must-revalidate".to_string(),
        };
        self.set(headers::CACHE_CONTROL, cache_control);
    }

    fn file_not_found(&mut self) {
        self.headers.retain(|(key, _)| key != headers::CONTENT_TYPE);
        self.status(404).end(Bytes::new());
    }

    fn stream(&mut self, source: Box<dyn ByteSource>, size: u64) {
        if self.finished {
            log::warn!("response already finished, dropping file stream");
            let mut session = StreamSession::new(source, size);
            session.on_abort();
            return;
        }
        self.finished = true;
        self.pending_stream = Some(StreamSession::new(source, size));
    }

    pub(crate) fn has_pending_stream(&self) -> bool {
        self.pending_stream.is_some()
    }

    /// Write the head and pump a parked file stream to completion
    pub(crate) async fn drive_pending_stream(&mut self) {
        let Some(mut session) = self.pending_stream.take() else {
            return;
        };

        let status = status_line(self.status_code());
        let headers = &self.headers;
        let mut head_written = false;
        if self.options.has_async {
            self.conn.cork(&mut |conn: &mut dyn HttpConnection| {
                if !conn.is_aborted() && !head_written {
                    write_head(conn, &status, headers);
                    head_written = true;
                }
            });
        } else if !self.conn.is_aborted() {
            write_head(self.conn.as_mut(), &status, headers);
            head_written = true;
        }

        if head_written {
            let state = session.drive(self.conn.as_mut()).await;
            log::trace!("file stream ended in state {:?}", state);
        } else {
            session.on_abort();
        }

        self.run_finish_hooks();
    }

    pub(crate) fn connection_mut(&mut self) -> &mut dyn HttpConnection {
        self.conn.as_mut()
    }

    fn run_finish_hooks(&mut self) {
        let status = self.status_code();
        for hook in self.finish_hooks.drain(..) {
            hook(status);
        }
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status_code())
            .field("headers", &self.headers)
            .field("has_async", &self.options.has_async)
            .field("finished", &self.finished)
            .field("pending_stream", &self.pending_stream)
            .finish()
    }
}

fn write_head(conn: &mut dyn HttpConnection, status: &str, headers: &[(String, String)]) {
    conn.write_status(status);
    for (name, value) in headers {
        conn.write_header(name, value);
    }
}

/// Percent-encode everything `encodeURI` would, leaving existing escapes alone
fn encode_uri(url: &str) -> String {
    const KEEP: &str = ";,/?:@&=+$-_.!~*'()#%[]";
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        if c.is_ascii_alphanumeric() || KEEP.contains(c) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{:02X}", byte);
            }
        }
    }
    out
}
