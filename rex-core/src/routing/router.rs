//! Route registration surface shared by [`App`](crate::App) and [`Router`].

use std::collections::HashMap;

use crate::http::HttpMethod;
use crate::middleware::{IntoChain, Middleware};

/// `get`/`post`/... registration helpers over a single `add`
pub trait Routing {
    /// Register `chain` for `method` on `path`
    fn add(&mut self, method: HttpMethod, path: &str, chain: Vec<Middleware>) -> &mut Self;

    fn get(&mut self, path: &str, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::GET, path, chain.into_chain())
    }

    fn post(&mut self, path: &str, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::POST, path, chain.into_chain())
    }

    fn put(&mut self, path: &str, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::PUT, path, chain.into_chain())
    }

    fn patch(&mut self, path: &str, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::PATCH, path, chain.into_chain())
    }

    /// `DELETE`
    fn del(&mut self, path: &str, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::DELETE, path, chain.into_chain())
    }

    fn head(&mut self, path: &str, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::HEAD, path, chain.into_chain())
    }

    fn options(&mut self, path: &str, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::OPTIONS, path, chain.into_chain())
    }

    fn connect(&mut self, path: &str, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::CONNECT, path, chain.into_chain())
    }

    fn trace(&mut self, path: &str, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::TRACE, path, chain.into_chain())
    }

    /// Every method
    fn any(&mut self, path: &str, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::ANY, path, chain.into_chain())
    }

    /// Alias of [`any`](Routing::any)
    fn all(&mut self, path: &str, chain: impl IntoChain) -> &mut Self {
        self.any(path, chain)
    }
}

/// One registration held by a [`Router`]
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub method: HttpMethod,
    pub path: String,
    pub chain: Vec<Middleware>,
}

#[derive(Debug, Clone, Default)]
struct EntryMap {
    entries: Vec<RouteEntry>,
    index: HashMap<String, usize>,
}

impl EntryMap {
    fn insert(&mut self, method: HttpMethod, path: &str, chain: Vec<Middleware>) {
        let key = format!("{}{}", method.as_str(), path);
        let entry = RouteEntry { method, path: path.to_string(), chain };
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot] = entry,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
            }
        }
    }
}

/// A group of routes registered on a fixed path by [`Router::route`]
#[derive(Debug, Clone)]
pub struct PrefixRoute {
    path: String,
    entries: EntryMap,
}

impl PrefixRoute {
    pub fn path(&self) -> &str {
        &self.path
    }

    fn add(&mut self, method: HttpMethod, chain: impl IntoChain) -> &mut Self {
        let path = self.path.clone();
        self.entries.insert(method, &path, chain.into_chain());
        self
    }

    pub fn get(&mut self, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::GET, chain)
    }

    pub fn post(&mut self, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::POST, chain)
    }

    pub fn put(&mut self, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::PUT, chain)
    }

    pub fn patch(&mut self, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::PATCH, chain)
    }

    pub fn del(&mut self, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::DELETE, chain)
    }

    pub fn head(&mut self, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::HEAD, chain)
    }

    pub fn options(&mut self, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::OPTIONS, chain)
    }

    pub fn connect(&mut self, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::CONNECT, chain)
    }

    pub fn trace(&mut self, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::TRACE, chain)
    }

    pub fn any(&mut self, chain: impl IntoChain) -> &mut Self {
        self.add(HttpMethod::ANY, chain)
    }

    pub fn all(&mut self, chain: impl IntoChain) -> &mut Self {
        self.any(chain)
    }
}

/// A mountable set of routes.
///
/// ```rust,ignore
/// let mut users = Router::new();
/// users.get("/:id", show_user);
/// users.route("/").get(list_users).post(create_user);
/// app.use_router("/users", users);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Router {
    own: EntryMap,
    prefix_routes: Vec<PrefixRoute>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a group of handlers on `path`
    pub fn route(&mut self, path: &str) -> &mut PrefixRoute {
        let index = self.prefix_routes.len();
        self.prefix_routes.push(PrefixRoute { path: path.to_string(), entries: EntryMap::default() });
        &mut self.prefix_routes[index]
    }

    /// Prefix-route entries first, then the router's own
    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.prefix_routes
            .iter()
            .flat_map(|route| route.entries.entries.iter())
            .chain(self.own.entries.iter())
    }

    pub fn into_entries(self) -> Vec<RouteEntry> {
        self.prefix_routes
            .into_iter()
            .flat_map(|route| route.entries.entries)
            .chain(self.own.entries)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Routing for Router {
    fn add(&mut self, method: HttpMethod, path: &str, chain: Vec<Middleware>) -> &mut Self {
        self.own.insert(method, path, chain);
        self
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
    fn test_method_helpers() {
        let mut router = Router::new();
        router.get("/a", noop()).del("/a", noop()).all("/b", [noop(), noop()]);

        let entries: Vec<_> = router.entries().collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].method, HttpMethod::DELETE);
        assert_eq!(entries[2].method, HttpMethod::ANY);
        assert_eq!(entries[2].chain.len(), 2);
    }

    #[test]
    fn test_duplicate_replaces() {
        let mut router = Router::new();
        router.get("/a", noop()).get("/a", vec![noop(), noop()]);
        assert_eq!(router.len(), 1);
        assert_eq!(router.entries().next().unwrap().chain.len(), 2);
    }

    #[test]
    fn test_prefix_routes_come_first() {
        let mut router = Router::new();
        router.get("/own", noop());
        router.route("/items").get(noop()).post(noop());

        let entries = router.into_entries();
        let paths: Vec<_> =
            entries.iter().map(|e| format!("{} {}", e.method, e.path)).collect();
        assert_eq!(paths, vec!["GET /items", "POST /items", "GET /own"]);
    }
}
