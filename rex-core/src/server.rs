//! Hyper transport binding.
//!
//! Every accepted connection is served by `hyper::server::conn::http1` on the
//! current [`LocalSet`](tokio::task::LocalSet). Each request becomes a
//! [`HyperConnection`] handed to [`Dispatcher::handle`] in its own local task;
//! the hyper service only waits for the response head through a oneshot
//! channel, so a streamed body keeps flowing after the head was returned.
//!
//! Backpressure comes from a bounded mpsc channel feeding the response body:
//! `try_end` fails with a full channel, `writable` waits for a free slot, and
//! a closed channel (hyper dropped the body because the peer left) aborts.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::rc::Rc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{Response, StatusCode};
use http_body::Frame;
use http_body_util::{combinators::BoxBody, BodyExt, Full, StreamBody};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use crate::dispatcher::Dispatcher;
use crate::error::{Result, RexError};
use crate::http::{HttpConnection, RequestHead};

pub type RespBody = BoxBody<Bytes, Infallible>;

/// Chunks buffered ahead of the socket before `try_end` reports backpressure
const STREAM_CAPACITY: usize = 8;

pub fn body_from<T: Into<Bytes>>(data: T) -> RespBody {
    Full::new(data.into()).boxed()
}

fn channel_body(mut rx: mpsc::Receiver<Bytes>) -> RespBody {
    let chunks = futures::stream::poll_fn(move |cx| {
        rx.poll_recv(cx).map(|chunk| chunk.map(|data| Ok::<_, Infallible>(Frame::data(data))))
    });
    StreamBody::new(chunks).boxed()
}

fn internal_error() -> Response<RespBody> {
    let mut response = Response::new(body_from("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// [`HttpConnection`] over one hyper request/response exchange
pub struct HyperConnection {
    body: Option<Incoming>,
    responder: Option<oneshot::Sender<Response<RespBody>>>,
    status: StatusCode,
    headers: Vec<(String, String)>,
    stream: Option<mpsc::Sender<Bytes>>,
    written: u64,
    aborted: bool,
    remote: Option<SocketAddr>,
}

impl HyperConnection {
    pub fn new(
        body: Incoming,
        responder: oneshot::Sender<Response<RespBody>>,
        remote: Option<SocketAddr>,
    ) -> Self {
        Self {
            body: Some(body),
            responder: Some(responder),
            status: StatusCode::OK,
            headers: Vec::new(),
            stream: None,
            written: 0,
            aborted: false,
            remote,
        }
    }

    /// Send the head with `body`. Only the first call has any effect.
    fn respond(&mut self, body: RespBody) {
        let Some(responder) = self.responder.take() else {
            log::warn!("response head already sent, ignoring a second one");
            return;
        };

        let mut builder = Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.body(body).unwrap_or_else(|err| {
            log::error!("Invalid response head: {}", err);
            internal_error()
        });

        if responder.send(response).is_err() {
            self.aborted = true;
        }
    }
}

#[async_trait(?Send)]
impl HttpConnection for HyperConnection {
    fn write_status(&mut self, status: &str) {
        self.status = status
            .split_whitespace()
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::OK);
    }

    fn write_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn end(&mut self, body: Bytes) {
        if self.is_aborted() {
            return;
        }
        self.written += body.len() as u64;
        match self.stream.take() {
            Some(tx) => {
                if !body.is_empty() && tx.try_send(body).is_err() {
                    log::debug!("dropping the tail of a streamed response");
                }
            }
            None => self.respond(body_from(body)),
        }
    }

    fn try_end(&mut self, chunk: Bytes, total_size: u64) -> (bool, bool) {
        if self.is_aborted() {
            return (false, false);
        }

        if self.stream.is_none() && self.responder.is_some() {
            let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
            self.headers.retain(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()));
            self.headers.push((CONTENT_LENGTH.to_string(), total_size.to_string()));
            self.respond(channel_body(rx));
            self.stream = Some(tx);
        }
        let Some(tx) = self.stream.as_ref() else {
            return (false, false);
        };

        let len = chunk.len() as u64;
        match tx.try_send(chunk) {
            Ok(()) => {
                self.written += len;
                let done = self.written >= total_size;
                if done {
                    self.stream = None;
                }
                (true, done)
            }
            Err(mpsc::error::TrySendError::Full(_)) => (false, false),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.aborted = true;
                (false, false)
            }
        }
    }

    fn write_offset(&self) -> u64 {
        self.written
    }

    fn is_aborted(&self) -> bool {
        self.aborted
            || self.responder.as_ref().is_some_and(|tx| tx.is_closed())
            || self.stream.as_ref().is_some_and(|tx| tx.is_closed())
    }

    fn cork(&mut self, f: &mut dyn FnMut(&mut dyn HttpConnection)) {
        // hyper writes the whole head and a full body in one go already
        f(self);
    }

    async fn writable(&mut self) -> Option<u64> {
        if let Some(tx) = self.stream.as_ref() {
            match tx.reserve().await {
                Ok(permit) => drop(permit),
                Err(_) => {
                    self.aborted = true;
                    return None;
                }
            }
        }
        (!self.is_aborted()).then_some(self.written)
    }

    async fn read_chunk(&mut self) -> Option<Bytes> {
        let body = self.body.as_mut()?;
        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        return Some(data);
                    }
                }
                Some(Err(err)) => {
                    log::debug!("request body error: {}", err);
                    self.aborted = true;
                    self.body = None;
                    return None;
                }
                None => {
                    self.body = None;
                    return None;
                }
            }
        }
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }
}

fn request_head(request: &Request<Incoming>, remote: SocketAddr) -> RequestHead {
    let target = request.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let mut head = RequestHead::new(request.method().as_str(), target).with_remote_addr(remote);
    head.headers = request
        .headers()
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();
    head
}

async fn handle_request(
    dispatcher: Rc<Dispatcher>,
    request: Request<Incoming>,
    remote: SocketAddr,
) -> std::result::Result<Response<RespBody>, Infallible> {
    let head = request_head(&request, remote);
    let (tx, rx) = oneshot::channel();
    let conn = HyperConnection::new(request.into_body(), tx, Some(remote));

    tokio::task::spawn_local(async move {
        dispatcher.handle(Box::new(conn), head).await;
    });

    match rx.await {
        Ok(response) => Ok(response),
        Err(_) => {
            log::warn!("Request from {} finished without a response", remote);
            Ok(internal_error())
        }
    }
}

/// Accept connections on `addr` forever. Must run inside a [`tokio::task::LocalSet`].
pub async fn serve(dispatcher: Rc<Dispatcher>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| RexError::Server(format!("Failed to bind to {}: {}", addr, err)))?;
    serve_listener(dispatcher, listener).await
}

/// Like [`serve`], on an already bound listener
pub async fn serve_listener(dispatcher: Rc<Dispatcher>, listener: TcpListener) -> Result<()> {
    log::info!("🚀 Rex listening on http://{}", listener.local_addr()?);

    loop {
        let (stream, remote) = listener.accept().await?;
        let dispatcher = dispatcher.clone();

        tokio::task::spawn_local(async move {
            let io = TokioIo::new(stream);
            let service =
                service_fn(move |request| handle_request(dispatcher.clone(), request, remote));

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                log::error!("Connection error from {}: {}", remote, err);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_body_yields_chunks() {
        let (tx, rx) = mpsc::channel(2);
        let body = channel_body(rx);
        tx.send(Bytes::from_static(b"ab")).await.unwrap();
        tx.send(Bytes::from_static(b"cd")).await.unwrap();
        drop(tx);

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"abcd");
    }

    #[test]
    fn test_internal_error_response() {
        assert_eq!(internal_error().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
