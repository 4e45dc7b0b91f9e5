//! Application builder.
//!
//! An [`App`] collects routes, sub-routers, global and error middlewares,
//! native transport hooks and settings. Nothing is dispatched from it
//! directly: [`App::build`] freezes it into a [`Dispatcher`], which
//! [`App::listen`] then serves over hyper.
//!
//! # Example
//!
//! ```rust,ignore
//! use rex_core::prelude::*;
//!
//! let mut app = App::new(RexConfig::load()?).with_prefer_json_errors(true);
//! app.use_middleware(http_logger(app.logger().clone()));
//! app.get("/end", Middleware::sync(|_req, res| {
//!     res.end("hello world");
//!     Ok(Flow::Next)
//! }));
//!
//! let mut api = Router::new();
//! api.get("/user/:id", Middleware::sync(|req, res| {
//!     res.json(&serde_json::json!({ "id": req.param("id") }))?;
//!     Ok(Flow::Next)
//! }));
//! app.use_router("/api", api);
//!
//! app.run("127.0.0.1:8080".parse()?)?;
//! ```

use std::net::SocketAddr;
use std::rc::Rc;

use crate::config::{BodyParsing, RexConfig};
use crate::dispatcher::{Dispatcher, DispatcherParts, NativeRoutes};
use crate::error::{Result, RexError};
use crate::http::HttpMethod;
use crate::logging::{init_logging, Logger};
use crate::middleware::{ErrorMiddleware, IntoChain, Middleware};
use crate::routing::{mount_path, RouteTable, Router, Routing};
use crate::server;
use crate::view::ViewRenderer;

/// Route and middleware registration for one application
pub struct App {
    config: RexConfig,
    logger: Logger,
    table: RouteTable,
    globals: Vec<Middleware>,
    error_handlers: Vec<ErrorMiddleware>,
    not_found: Option<Vec<Middleware>>,
    native: NativeRoutes,
    renderer: Option<Rc<dyn ViewRenderer>>,
    /// Registration failures, reported by `build`
    errors: Vec<RexError>,
}

impl Default for App {
    fn default() -> Self {
        Self::new(RexConfig::default())
    }
}

impl App {
    pub fn new(config: RexConfig) -> Self {
        let logger = Logger::new(&config.logging);
        let table = RouteTable::with_logger(logger.clone());
        Self {
            config,
            logger,
            table,
            globals: Vec::new(),
            error_handlers: Vec::new(),
            not_found: None,
            native: NativeRoutes::default(),
            renderer: None,
            errors: Vec::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Treat every chain as asynchronous (all writes corked)
    pub fn with_force_async(mut self, enabled: bool) -> Self {
        self.config.dispatch.force_async = enabled;
        self
    }

    /// Default not-found and error responses as JSON instead of HTML
    pub fn with_prefer_json_errors(mut self, enabled: bool) -> Self {
        self.config.dispatch.prefer_json_errors = enabled;
        self
    }

    pub fn with_body_parsing(mut self, body_parsing: BodyParsing) -> Self {
        self.config.dispatch.body_parsing = body_parsing;
        self
    }

    /// Files above this size are streamed by `send_file`
    pub fn with_max_inline_file_size(mut self, bytes: u64) -> Self {
        self.config.dispatch.max_inline_file_size = bytes;
        self
    }

    pub fn config(&self) -> &RexConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Global middleware, run before every route chain and the not-found chain
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.globals.push(middleware);
        self
    }

    /// Error handler, run in registration order before the default one
    pub fn use_error(&mut self, handler: ErrorMiddleware) -> &mut Self {
        self.error_handlers.push(handler);
        self
    }

    /// Mount every route of `router` under `prefix`
    pub fn use_router(&mut self, prefix: &str, router: Router) -> &mut Self {
        let trimmed = prefix.trim_end_matches('/');
        let mount_prefix = (!trimmed.is_empty()).then(|| trimmed.to_string());

        for entry in router.into_entries() {
            let path = mount_path(prefix, &entry.path);
            self.register(entry.method, &path, entry.chain, mount_prefix.clone());
        }
        self
    }

    /// Handlers that talk to the transport directly, matched before any route
    pub fn use_native_handlers(&mut self, mount: impl FnOnce(&mut NativeRoutes)) -> &mut Self {
        self.logger.warn("All native handlers will be mounted first");
        mount(&mut self.native);
        self
    }

    /// Replace the default not-found handler. Global middlewares still run first.
    pub fn not_found(&mut self, chain: impl IntoChain) -> &mut Self {
        self.not_found = Some(chain.into_chain());
        self
    }

    pub fn set_view(&mut self, renderer: impl ViewRenderer + 'static) -> &mut Self {
        self.renderer = Some(Rc::new(renderer));
        self
    }

    fn register(
        &mut self,
        method: HttpMethod,
        path: &str,
        chain: Vec<Middleware>,
        mount_prefix: Option<String>,
    ) {
        match self.table.register(method, path, chain, mount_prefix) {
            Ok(registered) => self.logger.info(format_args!(
                "Map {} {} => {} {}",
                method, path, method, registered.normalized_path
            )),
            Err(err) => {
                self.logger.error(&err);
                self.errors.push(err);
            }
        }
    }

    /// Freeze the application into a dispatcher.
    ///
    /// Fails with the first malformed route template, or an invalid configuration.
    pub fn build(self) -> Result<Dispatcher> {
        let App {
            config,
            logger,
            table,
            globals,
            error_handlers,
            not_found,
            native,
            renderer,
            errors,
        } = self;

        if let Some(err) = errors.into_iter().next() {
            return Err(err);
        }
        config.validate().map_err(|err| RexError::Config(format!("{:#}", err)))?;

        Ok(Dispatcher::new(DispatcherParts {
            table,
            globals,
            error_handlers,
            not_found,
            native,
            config: config.dispatch,
            renderer,
            logger,
        }))
    }

    /// Address from the `[server]` configuration
    pub fn configured_addr(&self) -> Result<SocketAddr> {
        let address = self.config.server.address();
        address
            .parse()
            .map_err(|err| RexError::Config(format!("invalid server address {}: {}", address, err)))
    }

    /// Build and serve on `addr`. Must run inside a [`tokio::task::LocalSet`].
    pub async fn listen(self, addr: SocketAddr) -> Result<()> {
        init_logging(&self.config.logging);
        let dispatcher = Rc::new(self.build()?);
        log::info!("Serving {} routes", dispatcher.routes().count());
        server::serve(dispatcher, addr).await
    }

    /// Blocking [`listen`](App::listen) on a current-thread runtime
    pub fn run(self, addr: SocketAddr) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let local = tokio::task::LocalSet::new();
        local.block_on(&runtime, self.listen(addr))
    }
}

impl Routing for App {
    fn add(&mut self, method: HttpMethod, path: &str, chain: Vec<Middleware>) -> &mut Self {
        self.register(method, path, chain, None);
        self
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.table.len())
            .field("globals", &self.globals.len())
            .field("error_handlers", &self.error_handlers.len())
            .field("native", &self.native)
            .field("errors", &self.errors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Flow;

    fn noop() -> Middleware {
        Middleware::sync(|_req, _res| Ok(Flow::Next))
    }

    #[test]
    fn test_malformed_template_fails_build() {
        let mut app = App::default();
        app.get("/ok", noop()).get("/user/:", noop());
        let err = app.build().unwrap_err();
        assert!(matches!(err, RexError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_route_table_shares_app_logger() {
        let mut config = RexConfig::default();
        config.logging.prefix = "[shop]".to_string();
        let mut app = App::new(config);
        assert_eq!(app.table.logger().prefix(), "[shop]");

        app.get("/item/:id", noop()).get("/item/:sku", noop());
        assert_eq!(app.table.overrides(), 1);
        assert_eq!(app.table.len(), 1);
        assert!(app.errors.is_empty());
    }

    #[test]
    fn test_use_router_mounts_under_prefix() {
        let mut router = Router::new();
        router.get("/", noop()).get("/user/:id", noop());

        let mut app = App::default();
        app.use_router("/api/", router);
        let dispatcher = app.build().unwrap();

        let records: Vec<_> = dispatcher
            .routes()
            .map(|r| (r.original_template.clone(), r.mount_prefix.clone()))
            .collect();
        assert_eq!(
            records,
            vec![
                ("/api".to_string(), Some("/api".to_string())),
                ("/api/user/:id".to_string(), Some("/api".to_string())),
            ]
        );
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let app = App::default().with_max_inline_file_size(0);
        assert!(matches!(app.build().unwrap_err(), RexError::Config(_)));
    }

    #[test]
    fn test_builder_methods_override_config() {
        let app = App::default().with_port(9000).with_host("0.0.0.0").with_force_async(true);
        assert_eq!(app.config().server.port, 9000);
        assert!(app.config().dispatch.force_async);
        assert_eq!(app.configured_addr().unwrap().port(), 9000);
    }
}
