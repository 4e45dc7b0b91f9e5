//! Flow-controlled streaming of large bodies.
//!
//! [`StreamSession`] pumps a [`ByteSource`] into an [`HttpConnection`] with
//! `try_end`, one chunk at a time:
//!
//! ```text
//! Idle -> Streaming -> Complete
//!            |  ^
//!            v  |  (writable, remainder accepted)
//!         Draining
//! any state -> Aborted (peer gone) | Failed (read error)
//! ```
//!
//! When a chunk is only partly accepted the source is paused and the chunk is
//! kept together with the write offset observed *before* the attempt. On the
//! next writable event the unsent tail (`chunk[offset - kept_offset..]`) is
//! replayed. The source is destroyed exactly once, whichever of completion,
//! read error or abort comes first.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use crate::http::{status_line, HttpConnection};

/// Chunk size used by [`FileByteSource`]
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A pull-based byte producer
#[async_trait(?Send)]
pub trait ByteSource {
    /// Next chunk, `Ok(None)` once exhausted
    async fn read_chunk(&mut self) -> std::io::Result<Option<Bytes>>;

    fn pause(&mut self);

    fn resume(&mut self);

    fn is_paused(&self) -> bool;

    /// Release the underlying resource
    fn destroy(&mut self);
}

/// Reads a file in fixed-size chunks
pub struct FileByteSource {
    file: Option<tokio::fs::File>,
    chunk_size: usize,
    paused: bool,
}

impl FileByteSource {
    pub fn from_std(file: std::fs::File) -> Self {
        Self { file: Some(tokio::fs::File::from_std(file)), chunk_size: DEFAULT_CHUNK_SIZE, paused: false }
    }

    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::from_std(std::fs::File::open(path)?))
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[async_trait(?Send)]
impl ByteSource for FileByteSource {
    async fn read_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };
        let mut buf = vec![0u8; self.chunk_size];
        let read = file.read(&mut buf).await?;
        if read == 0 {
            return Ok(None);
        }
        buf.truncate(read);
        Ok(Some(Bytes::from(buf)))
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn destroy(&mut self) {
        self.file = None;
    }
}

/// Streaming state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    /// Waiting for the outbound buffer to drain
    Draining,
    Complete,
    Aborted,
    /// The source failed; a 404 was sent
    Failed,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Complete | StreamState::Aborted | StreamState::Failed)
    }
}

struct PendingChunk {
    chunk: Bytes,
    offset: u64,
}

/// One streamed response body
pub struct StreamSession {
    source: Box<dyn ByteSource>,
    total_size: u64,
    state: StreamState,
    pending: Option<PendingChunk>,
    destroyed: bool,
    destroy_count: usize,
}

impl StreamSession {
    pub fn new(source: Box<dyn ByteSource>, total_size: u64) -> Self {
        Self {
            source,
            total_size,
            state: StreamState::Idle,
            pending: None,
            destroyed: false,
            destroy_count: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// How many times the source was actually destroyed (0 or 1)
    pub fn destroy_count(&self) -> usize {
        self.destroy_count
    }

    pub fn source(&self) -> &dyn ByteSource {
        self.source.as_ref()
    }

    /// `Idle -> Streaming`. Headers must already be written.
    pub fn start(&mut self) {
        if self.state == StreamState::Idle {
            self.state = StreamState::Streaming;
        }
    }

    /// Push one chunk read from the source
    pub fn on_chunk(&mut self, conn: &mut dyn HttpConnection, chunk: Bytes) -> StreamState {
        if self.state != StreamState::Streaming {
            return self.state;
        }
        if conn.is_aborted() {
            return self.on_abort();
        }

        let last_offset = conn.write_offset();
        let (accepted, done) = conn.try_end(chunk.clone(), self.total_size);

        if done {
            self.complete();
        } else if !accepted {
            self.source.pause();
            self.pending = Some(PendingChunk { chunk, offset: last_offset });
            self.state = StreamState::Draining;
        }
        self.state
    }

    /// The outbound buffer drained; `offset` is the connection's write offset.
    ///
    /// Returns whether the retained remainder was fully accepted.
    pub fn on_writable(&mut self, conn: &mut dyn HttpConnection, offset: u64) -> bool {
        if self.state != StreamState::Draining {
            return true;
        }
        if conn.is_aborted() {
            self.on_abort();
            return false;
        }
        let Some(pending) = self.pending.take() else {
            self.state = StreamState::Streaming;
            self.source.resume();
            return true;
        };

        let sent = offset.saturating_sub(pending.offset) as usize;
        let remainder = pending.chunk.slice(sent.min(pending.chunk.len())..);
        let (accepted, done) = conn.try_end(remainder, self.total_size);

        if done {
            self.complete();
        } else if accepted {
            self.source.resume();
            self.state = StreamState::Streaming;
        } else {
            self.pending = Some(pending);
        }
        accepted
    }

    /// The source failed: answer 404 and stop
    pub fn on_read_error(&mut self, conn: &mut dyn HttpConnection, err: &std::io::Error) -> StreamState {
        if self.state.is_terminal() {
            return self.state;
        }
        log::trace!("stream read failed: {}", err);
        self.pending = None;
        self.destroy();
        if !conn.is_aborted() {
            conn.write_status(&status_line(404));
            conn.end(Bytes::new());
        }
        self.state = StreamState::Failed;
        self.state
    }

    /// The peer went away. No further writes happen after this.
    pub fn on_abort(&mut self) -> StreamState {
        if self.state.is_terminal() {
            return self.state;
        }
        self.pending = None;
        self.destroy();
        self.state = StreamState::Aborted;
        self.state
    }

    fn complete(&mut self) {
        self.pending = None;
        self.destroy();
        self.state = StreamState::Complete;
    }

    fn destroy(&mut self) {
        if self.destroyed {
            log::error!("stream finished twice for the same response, source already released");
            return;
        }
        self.destroyed = true;
        self.destroy_count += 1;
        self.source.destroy();
    }

    /// Run the session until it reaches a terminal state
    pub async fn drive(&mut self, conn: &mut dyn HttpConnection) -> StreamState {
        self.start();
        loop {
            match self.state {
                StreamState::Streaming => {
                    if conn.is_aborted() {
                        self.on_abort();
                        continue;
                    }
                    match self.source.read_chunk().await {
                        Ok(Some(chunk)) => {
                            self.on_chunk(conn, chunk);
                        }
                        Ok(None) => {
                            let short = std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "source ended before the announced size",
                            );
                            self.on_read_error(conn, &short);
                        }
                        Err(err) => {
                            self.on_read_error(conn, &err);
                        }
                    }
                }
                StreamState::Draining => match conn.writable().await {
                    Some(offset) => {
                        self.on_writable(conn, offset);
                    }
                    None => {
                        self.on_abort();
                    }
                },
                StreamState::Idle => self.start(),
                _ => return self.state,
            }
        }
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("total_size", &self.total_size)
            .field("state", &self.state)
            .field("pending", &self.pending.as_ref().map(|p| (p.offset, p.chunk.len())))
            .field("destroy_count", &self.destroy_count)
            .finish()
    }
}
