//! Middleware chains.
//!
//! A middleware receives the request and the response and answers with a
//! [`HandlerResult`]:
//!
//! - `Ok(Flow::Next)` continues with the next middleware of the chain;
//! - `Err(err)` skips the rest of the chain and hands `err` to the error chain;
//! - `Ok(Flow::Halt)` stops here; the middleware owns the response from now on.
//!
//! Whether a middleware is asynchronous is decided when it is built
//! ([`Middleware::sync`] vs [`Middleware::future`]), and error handlers are a
//! separate type ([`ErrorMiddleware`]), so the dispatcher never guesses from a
//! function's shape. Panics raised by a handler are caught and forwarded to
//! the error chain like any other error.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::FutureExt;
//! use rex_core::prelude::*;
//!
//! let auth = Middleware::sync(|req, res| {
//!     if req.get("authorization")?.is_none() {
//!         res.status(401).end("missing credentials");
//!         return Ok(Flow::Halt);
//!     }
//!     Ok(Flow::Next)
//! });
//!
//! let slow = Middleware::future(|_req, res| {
//!     async move {
//!         tokio::task::yield_now().await;
//!         res.end("done");
//!         Ok(Flow::Next)
//!     }
//!     .boxed_local()
//! });
//! ```

pub mod body_parser;
pub mod defaults;
pub mod http_logger;

pub use body_parser::{body_parser, multipart_parser, parse_body, MultipartOptions};
pub use defaults::{error_handler, not_found_handler, to_html};
pub use http_logger::http_logger;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::request::Request;
use crate::response::Response;

/// Anything a middleware forwards to the error chain
pub type HandlerError = anyhow::Error;

/// What a middleware returns
pub type HandlerResult = Result<Flow, HandlerError>;

/// Continuation decision of a successful middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Call the next middleware
    Next,
    /// Do not call the continuation
    Halt,
}

type SyncHandler = dyn Fn(&mut Request, &mut Response) -> HandlerResult;
type AsyncHandler =
    dyn for<'a> Fn(&'a mut Request, &'a mut Response) -> LocalBoxFuture<'a, HandlerResult>;

type SyncErrorHandler = dyn Fn(&HandlerError, &mut Request, &mut Response) -> HandlerResult;
type AsyncErrorHandler = dyn for<'a> Fn(
    &'a HandlerError,
    &'a mut Request,
    &'a mut Response,
) -> LocalBoxFuture<'a, HandlerResult>;

#[derive(Clone)]
enum Handler {
    Sync(Rc<SyncHandler>),
    Async(Rc<AsyncHandler>),
}

/// One link of a request chain
#[derive(Clone)]
pub struct Middleware {
    handler: Handler,
}

impl Middleware {
    /// A middleware that completes within the dispatch turn
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&mut Request, &mut Response) -> HandlerResult + 'static,
    {
        Self { handler: Handler::Sync(Rc::new(f)) }
    }

    /// A middleware that may suspend; its response writes go through the corked path
    pub fn future<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response) -> LocalBoxFuture<'a, HandlerResult>
            + 'static,
    {
        Self { handler: Handler::Async(Rc::new(f)) }
    }

    pub fn is_async(&self) -> bool {
        matches!(self.handler, Handler::Async(_))
    }

    pub(crate) async fn invoke(&self, req: &mut Request, res: &mut Response) -> HandlerResult {
        match &self.handler {
            Handler::Sync(f) => {
                catch_unwind(AssertUnwindSafe(move || f(req, res))).unwrap_or_else(|p| Err(panicked(p)))
            }
            // a panic while building the future unwinds from inside the first poll
            Handler::Async(f) => AssertUnwindSafe(async move { f(req, res).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|p| Err(panicked(p))),
        }
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_async() { "async" } else { "sync" };
        f.debug_struct("Middleware").field("kind", &kind).finish()
    }
}

#[derive(Clone)]
enum ErrorHandlerFn {
    Sync(Rc<SyncErrorHandler>),
    Async(Rc<AsyncErrorHandler>),
}

/// A link of the error chain. Receives the error first.
///
/// `Ok(Flow::Next)` forwards the same error to the next error handler,
/// `Err(other)` forwards `other` instead.
#[derive(Clone)]
pub struct ErrorMiddleware {
    handler: ErrorHandlerFn,
}

impl ErrorMiddleware {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&HandlerError, &mut Request, &mut Response) -> HandlerResult + 'static,
    {
        Self { handler: ErrorHandlerFn::Sync(Rc::new(f)) }
    }

    pub fn future<F>(f: F) -> Self
    where
        F: for<'a> Fn(
                &'a HandlerError,
                &'a mut Request,
                &'a mut Response,
            ) -> LocalBoxFuture<'a, HandlerResult>
            + 'static,
    {
        Self { handler: ErrorHandlerFn::Async(Rc::new(f)) }
    }

    pub fn is_async(&self) -> bool {
        matches!(self.handler, ErrorHandlerFn::Async(_))
    }

    pub(crate) async fn invoke(
        &self,
        err: &HandlerError,
        req: &mut Request,
        res: &mut Response,
    ) -> HandlerResult {
        match &self.handler {
            ErrorHandlerFn::Sync(f) => catch_unwind(AssertUnwindSafe(move || f(err, req, res)))
                .unwrap_or_else(|p| Err(panicked(p))),
            ErrorHandlerFn::Async(f) => AssertUnwindSafe(async move { f(err, req, res).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|p| Err(panicked(p))),
        }
    }
}

impl std::fmt::Debug for ErrorMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_async() { "async" } else { "sync" };
        f.debug_struct("ErrorMiddleware").field("kind", &kind).finish()
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> HandlerError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    anyhow::anyhow!("handler panicked: {}", message)
}

/// Conversion into an ordered list of middlewares, so registration accepts
/// one middleware, an array or a `Vec`.
pub trait IntoChain {
    fn into_chain(self) -> Vec<Middleware>;
}

impl IntoChain for Middleware {
    fn into_chain(self) -> Vec<Middleware> {
        vec![self]
    }
}

impl IntoChain for Vec<Middleware> {
    fn into_chain(self) -> Vec<Middleware> {
        self
    }
}

impl<const N: usize> IntoChain for [Middleware; N] {
    fn into_chain(self) -> Vec<Middleware> {
        self.into_iter().collect()
    }
}
