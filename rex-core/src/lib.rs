//! Rex - Core
//!
//! Express-style routing and middleware dispatch over a single-threaded,
//! event-driven hyper transport, with backpressure-aware responses.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rex_core::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut app = App::new(RexConfig::load()?);
//!     app.get("/end", Middleware::sync(|_req, res| {
//!         res.end("hello world");
//!         Ok(Flow::Next)
//!     }));
//!     app.post("/echo", Middleware::sync(|req, res| {
//!         res.json(&req.body())?;
//!         Ok(Flow::Next)
//!     }));
//!     app.run("127.0.0.1:8080".parse()?)?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`routing`] - template compiler, route table, sub-routers
//! - [`request`] / [`response`] - the facades handlers see
//! - [`middleware`] - chain links, built-in parsers and default handlers
//! - [`dispatcher`] - the frozen pipeline that runs a request
//! - [`app`] / [`registry`] - registration surface and named apps
//! - [`server`] - hyper binding of the [`http::HttpConnection`] contract
//! - [`config`] / [`logging`] - TOML + env configuration, prefixed logger

pub mod app;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod prelude;
pub mod registry;
pub mod request;
pub mod response;
pub mod routing;
pub mod server;
pub mod testing;
pub mod view;

pub use app::App;
pub use dispatcher::{Dispatcher, NativeRoutes};
pub use error::{Result, RexError};
pub use middleware::{ErrorMiddleware, Flow, HandlerError, HandlerResult, Middleware};
pub use request::Request;
pub use response::Response;
pub use routing::{Router, Routing};
