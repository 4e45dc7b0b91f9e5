//! Prelude module for convenient imports
//!
//! ```rust,ignore
//! use rex_core::prelude::*;
//! ```

pub use crate::app::App;
pub use crate::config::{BodyParsing, RexConfig};
pub use crate::dispatcher::{Dispatcher, NativeRoutes};
pub use crate::error::RexError;
pub use crate::http::{HttpConnection, HttpMethod, RequestHead};
pub use crate::logging::Logger;
pub use crate::middleware::{
    body_parser, http_logger, multipart_parser, ErrorMiddleware, Flow, HandlerError,
    HandlerResult, IntoChain, Middleware, MultipartOptions,
};
pub use crate::registry::{AppId, AppOptions, AppRegistry};
pub use crate::request::{Body, Request};
pub use crate::response::{
    CookieOptions, CookieValue, FileSource, Payload, Response, SameSite, SendFileOptions,
};
pub use crate::routing::{Router, Routing};
pub use crate::view::ViewRenderer;
