//! Request dispatcher.
//!
//! A [`Dispatcher`] is the frozen form of an [`App`](crate::App): the route
//! table plus, for every record, its full middleware chain (built-in parsers,
//! then global middlewares, then the route's own) computed once at build time.
//!
//! Each request walks an explicit state machine:
//!
//! ```text
//! Matching -> BodyAwait -> Running(0) -> Running(1) -> ... -> Done
//!                              \-- Err --> ErrorRunning(0) -> ... -> Done
//! ```
//!
//! `BodyAwait` only happens for POST, PUT and PATCH: the whole body is read
//! before the first middleware runs. Native routes bypass all of this.

use std::collections::HashMap;
use std::rc::Rc;

use bytes::BytesMut;

use crate::config::DispatchConfig;
use crate::http::{headers, HttpConnection, HttpMethod, RequestHead};
use crate::logging::Logger;
use crate::middleware::{
    body_parser, error_handler, multipart_parser, not_found_handler, ErrorMiddleware, Flow,
    HandlerError, Middleware, MultipartOptions,
};
use crate::request::{Request, RequestOptions};
use crate::response::{Response, ResponseOptions};
use crate::routing::{RouteRecord, RouteTable};
use crate::view::ViewRenderer;

/// Handler mounted straight on the transport, outside any chain
pub type NativeHandler = Rc<dyn Fn(&RequestHead, &mut dyn HttpConnection)>;

/// Exact `method + path` handlers consulted before the route table
#[derive(Clone, Default)]
pub struct NativeRoutes {
    routes: Vec<(HttpMethod, String, NativeHandler)>,
}

impl NativeRoutes {
    pub fn add<F>(&mut self, method: HttpMethod, path: &str, handler: F) -> &mut Self
    where
        F: Fn(&RequestHead, &mut dyn HttpConnection) + 'static,
    {
        self.routes.push((method, path.to_string(), Rc::new(handler)));
        self
    }

    pub fn get<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(&RequestHead, &mut dyn HttpConnection) + 'static,
    {
        self.add(HttpMethod::GET, path, handler)
    }

    pub fn any<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(&RequestHead, &mut dyn HttpConnection) + 'static,
    {
        self.add(HttpMethod::ANY, path, handler)
    }

    fn find(&self, head: &RequestHead) -> Option<&NativeHandler> {
        let method = head.method.parse::<HttpMethod>().ok();
        self.routes
            .iter()
            .find(|(m, path, _)| {
                (*m == HttpMethod::ANY || Some(*m) == method) && *path == head.url
            })
            .map(|(_, _, handler)| handler)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for NativeRoutes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|(method, path, _)| format!("{} {}", method, path)))
            .finish()
    }
}

/// A complete chain, ready to run
#[derive(Debug)]
struct RouteChain {
    middlewares: Vec<Middleware>,
    /// Some middleware may suspend past the dispatch turn
    has_async: bool,
}

impl RouteChain {
    fn new(middlewares: Vec<Middleware>, force_async: bool) -> Self {
        let has_async = force_async || middlewares.iter().any(Middleware::is_async);
        Self { middlewares, has_async }
    }
}

enum DispatchState {
    Matching,
    BodyAwait,
    Running(usize),
    ErrorRunning(usize, HandlerError),
    Done,
}

struct Exchange<'d> {
    chain: &'d RouteChain,
    req: Request,
    res: Response,
}

/// Everything [`Dispatcher::new`] compiles
pub(crate) struct DispatcherParts {
    pub table: RouteTable,
    pub globals: Vec<Middleware>,
    pub error_handlers: Vec<ErrorMiddleware>,
    pub not_found: Option<Vec<Middleware>>,
    pub native: NativeRoutes,
    pub config: DispatchConfig,
    pub renderer: Option<Rc<dyn ViewRenderer>>,
    pub logger: Logger,
}

/// Immutable dispatch pipeline
pub struct Dispatcher {
    table: RouteTable,
    chains: HashMap<String, RouteChain>,
    not_found: RouteChain,
    error_chain: Vec<ErrorMiddleware>,
    native: NativeRoutes,
    config: DispatchConfig,
    renderer: Option<Rc<dyn ViewRenderer>>,
}

impl Dispatcher {
    pub(crate) fn new(parts: DispatcherParts) -> Self {
        let DispatcherParts {
            table,
            globals,
            error_handlers,
            not_found,
            native,
            config,
            renderer,
            logger,
        } = parts;

        let mut leading = Vec::new();
        if config.body_parsing.body_parser() {
            leading.push(body_parser());
        }
        if config.body_parsing.multipart_parser() {
            leading.push(multipart_parser(MultipartOptions::default()));
        }
        leading.extend(globals.iter().cloned());

        let chains = table
            .records()
            .map(|record| {
                let mut middlewares = leading.clone();
                middlewares.extend(record.middleware_chain.iter().cloned());
                (record.key(), RouteChain::new(middlewares, config.force_async))
            })
            .collect();

        let mut fallback = globals;
        match not_found {
            Some(custom) => fallback.extend(custom),
            None => fallback.push(not_found_handler(config.prefer_json_errors, logger.clone())),
        }
        let not_found = RouteChain::new(fallback, config.force_async);

        let mut error_chain = error_handlers;
        error_chain.push(error_handler(config.prefer_json_errors, logger));

        Self { table, chains, not_found, error_chain, native, config, renderer }
    }

    /// Compiled route records, in registration order
    pub fn routes(&self) -> impl Iterator<Item = &RouteRecord> {
        self.table.records()
    }

    /// Run one request to completion
    pub async fn handle(&self, conn: Box<dyn HttpConnection>, head: RequestHead) {
        let mut conn = conn;
        if let Some(native) = self.native.find(&head) {
            native(&head, conn.as_mut());
            return;
        }

        let mut pending = Some((conn, head));
        let mut exchange: Option<Exchange<'_>> = None;
        let mut state = DispatchState::Matching;

        loop {
            state = match state {
                DispatchState::Matching => match pending.take() {
                    Some((conn, head)) => {
                        let matched = self.matching(conn, head);
                        let next = if matched.req.method().has_body() {
                            DispatchState::BodyAwait
                        } else {
                            DispatchState::Running(0)
                        };
                        exchange = Some(matched);
                        next
                    }
                    None => DispatchState::Done,
                },
                DispatchState::Done => break,
                state => match exchange.as_mut() {
                    Some(ex) => self.step(ex, state).await,
                    None => DispatchState::Done,
                },
            };
        }
    }

    fn matching(&self, conn: Box<dyn HttpConnection>, head: RequestHead) -> Exchange<'_> {
        let method = head.method.parse().unwrap_or(HttpMethod::ANY);
        let cookie_parsing = self.config.body_parsing.cookie_parser();

        let (chain, options) = match self.table.lookup(method, &head.url) {
            Some(found) => {
                let chain = self.chains.get(&found.record.key()).unwrap_or(&self.not_found);
                let options = RequestOptions {
                    parameter_names: found.record.parameter_names.clone(),
                    parameter_values: found.values,
                    cookie_parsing,
                    base_url: found.record.mount_prefix.clone(),
                };
                (chain, options)
            }
            None => (&self.not_found, RequestOptions { cookie_parsing, ..Default::default() }),
        };

        let referrer = head
            .header(headers::REFERER)
            .or_else(|| head.header(headers::REFERRER))
            .map(str::to_string);
        let res = Response::new(
            conn,
            ResponseOptions {
                has_async: chain.has_async || method.has_body(),
                max_inline_file_size: self.config.max_inline_file_size,
                referrer,
                renderer: self.renderer.clone(),
                prefer_json: self.config.prefer_json_errors,
            },
        );

        Exchange { chain, req: Request::new(head, options), res }
    }

    async fn step(&self, ex: &mut Exchange<'_>, state: DispatchState) -> DispatchState {
        match state {
            DispatchState::BodyAwait => {
                let mut raw = BytesMut::new();
                while let Some(chunk) = ex.res.connection_mut().read_chunk().await {
                    raw.extend_from_slice(&chunk);
                }
                if ex.res.is_aborted() {
                    log::trace!("peer went away while reading the body of {}", ex.req.url());
                    return DispatchState::Done;
                }
                if !raw.is_empty() {
                    ex.req.set_raw(Some(raw.freeze()));
                }
                DispatchState::Running(0)
            }
            DispatchState::Running(index) => {
                let chain = ex.chain;
                let Some(middleware) = chain.middlewares.get(index) else {
                    return DispatchState::Done;
                };
                let result = middleware.invoke(&mut ex.req, &mut ex.res).await;
                if ex.res.has_pending_stream() {
                    ex.res.drive_pending_stream().await;
                }

                match result {
                    Ok(Flow::Next) => DispatchState::Running(index + 1),
                    Ok(Flow::Halt) => DispatchState::Done,
                    Err(err) => DispatchState::ErrorRunning(0, err),
                }
            }
            DispatchState::ErrorRunning(index, err) => {
                let Some(handler) = self.error_chain.get(index) else {
                    return DispatchState::Done;
                };
                let result = handler.invoke(&err, &mut ex.req, &mut ex.res).await;
                if ex.res.has_pending_stream() {
                    ex.res.drive_pending_stream().await;
                }

                match result {
                    Ok(Flow::Next) => DispatchState::ErrorRunning(index + 1, err),
                    Ok(Flow::Halt) => DispatchState::Done,
                    Err(other) => DispatchState::ErrorRunning(index + 1, other),
                }
            }
            DispatchState::Matching | DispatchState::Done => DispatchState::Done,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.table.len())
            .field("error_handlers", &self.error_chain.len())
            .field("native", &self.native)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;
    use futures::FutureExt;

    fn parts(table: RouteTable, globals: Vec<Middleware>) -> DispatcherParts {
        DispatcherParts {
            table,
            globals,
            error_handlers: Vec::new(),
            not_found: None,
            native: NativeRoutes::default(),
            config: DispatchConfig::default(),
            renderer: None,
            logger: Logger::silent(),
        }
    }

    #[test]
    fn test_has_async_is_static() {
        let mut table = RouteTable::new();
        let sync = Middleware::sync(|_req, _res| Ok(Flow::Next));
        let suspending = Middleware::future(|_req, _res| async { Ok(Flow::Next) }.boxed_local());
        table.register(HttpMethod::GET, "/sync", vec![sync.clone()], None).unwrap();
        table.register(HttpMethod::GET, "/async", vec![suspending], None).unwrap();

        let dispatcher = Dispatcher::new(parts(table, vec![sync]));
        assert!(!dispatcher.chains["GET/sync"].has_async);
        assert!(dispatcher.chains["GET/async"].has_async);
        // body parser + multipart parser + global + route
        assert_eq!(dispatcher.chains["GET/sync"].middlewares.len(), 4);
        assert!(!dispatcher.not_found.has_async);
    }

    #[tokio::test]
    async fn test_native_routes_bypass_chain() {
        let mut native = NativeRoutes::default();
        native.get("/health", |_head, conn| {
            conn.write_status("200 OK");
            conn.end(bytes::Bytes::from_static(b"native"));
        });
        let mut table = RouteTable::new();
        table
            .register(
                HttpMethod::GET,
                "/health",
                vec![Middleware::sync(|_req, res| {
                    res.end("chain");
                    Ok(Flow::Halt)
                })],
                None,
            )
            .unwrap();

        let dispatcher = Dispatcher::new(DispatcherParts { native, ..parts(table, Vec::new()) });
        let conn = MockConnection::new();
        dispatcher.handle(Box::new(conn.clone()), RequestHead::new("GET", "/health")).await;
        assert_eq!(conn.state().body, b"native");
    }

    #[tokio::test]
    async fn test_abort_during_body_await_stops() {
        let seen = Rc::new(std::cell::Cell::new(false));
        let flag = seen.clone();
        let mut table = RouteTable::new();
        table
            .register(
                HttpMethod::POST,
                "/upload",
                vec![Middleware::sync(move |_req, _res| {
                    flag.set(true);
                    Ok(Flow::Next)
                })],
                None,
            )
            .unwrap();

        let dispatcher = Dispatcher::new(parts(table, Vec::new()));
        let conn = MockConnection::new();
        conn.push_request_chunk(b"partial");
        conn.abort();
        dispatcher.handle(Box::new(conn.clone()), RequestHead::new("POST", "/upload")).await;
        assert!(!seen.get());
        assert!(conn.state().status.is_none());
    }
}
