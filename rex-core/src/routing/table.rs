//! Route table: `(method, compiled path) -> middleware chain`.
//!
//! All pattern work happens in [`RouteTable::register`]. Each key is also
//! threaded into a per-method segment index so a request path resolves with
//! one walk: literal child first, then the placeholder child, then the
//! catch-all. Method-specific routes are tried before `ANY` routes.

use std::collections::HashMap;

use crate::error::Result;
use crate::http::HttpMethod;
use crate::logging::Logger;
use crate::middleware::Middleware;

use super::path::compile;

/// A registered route
#[derive(Clone)]
pub struct RouteRecord {
    pub method: HttpMethod,
    /// Positional form of the template (`/user/:value1`), part of the lookup key
    pub compiled_path: String,
    /// Template with named parameters (`/user/:id`)
    pub normalized_path: String,
    pub parameter_names: Vec<String>,
    /// The template as authored
    pub original_template: String,
    pub middleware_chain: Vec<Middleware>,
    /// Prefix the route was mounted under, if it came from a sub-router
    pub mount_prefix: Option<String>,
}

impl RouteRecord {
    /// Lookup key, `method + compiled_path`
    pub fn key(&self) -> String {
        route_key(self.method, &self.compiled_path)
    }

    /// Whether this is the `ANY /*` catch-all
    pub fn is_catch_all(&self) -> bool {
        self.method == HttpMethod::ANY && self.compiled_path == "/*"
    }
}

impl std::fmt::Debug for RouteRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRecord")
            .field("method", &self.method)
            .field("compiled_path", &self.compiled_path)
            .field("normalized_path", &self.normalized_path)
            .field("parameter_names", &self.parameter_names)
            .field("original_template", &self.original_template)
            .field("middlewares", &self.middleware_chain.len())
            .field("mount_prefix", &self.mount_prefix)
            .finish()
    }
}

pub(crate) fn route_key(method: HttpMethod, compiled_path: &str) -> String {
    format!("{}{}", method.as_str(), compiled_path)
}

/// Result of a successful lookup
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub record: &'a RouteRecord,
    /// Positional parameter values, index-aligned with `record.parameter_names`
    pub values: Vec<String>,
}

#[derive(Default)]
struct SegmentNode {
    literals: HashMap<String, SegmentNode>,
    placeholder: Option<Box<SegmentNode>>,
    catch_all: Option<usize>,
    terminal: Option<usize>,
}

impl SegmentNode {
    fn insert(&mut self, compiled_path: &str, slot: usize) {
        let mut node = self;
        for segment in compiled_path.split('/').filter(|s| !s.is_empty()) {
            if segment == "*" {
                node.catch_all = Some(slot);
                return;
            }
            node = if segment.starts_with(':') {
                &mut **node.placeholder.get_or_insert_with(Default::default)
            } else {
                node.literals.entry(segment.to_string()).or_default()
            };
        }
        node.terminal = Some(slot);
    }

    fn find(&self, segments: &[&str], values: &mut Vec<String>) -> Option<usize> {
        let Some((head, rest)) = segments.split_first() else {
            return self.terminal.or(self.catch_all);
        };

        if let Some(child) = self.literals.get(*head) {
            if let Some(slot) = child.find(rest, values) {
                return Some(slot);
            }
        }

        if let Some(child) = &self.placeholder {
            values.push(decode_segment(head));
            if let Some(slot) = child.find(rest, values) {
                return Some(slot);
            }
            values.pop();
        }

        self.catch_all
    }
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment).map(|s| s.into_owned()).unwrap_or_else(|_| segment.to_string())
}

/// Outcome of [`RouteTable::register`]
#[derive(Debug)]
pub struct Registered {
    /// Template with named parameters, as stored on the record
    pub normalized_path: String,
    /// The record this registration overwrote
    pub replaced: Option<RouteRecord>,
}

/// Keyed store of route records
#[derive(Default)]
pub struct RouteTable {
    records: Vec<RouteRecord>,
    index: HashMap<String, usize>,
    trees: HashMap<HttpMethod, SegmentNode>,
    overrides: usize,
    logger: Logger,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table reporting overrides through `logger`
    pub fn with_logger(logger: Logger) -> Self {
        Self { logger, ..Self::default() }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Compile `template` and store the chain under `method + compiled key`.
    ///
    /// Re-registering an existing key replaces the record in place and logs
    /// one warning naming both templates.
    pub fn register(
        &mut self,
        method: HttpMethod,
        template: &str,
        middleware_chain: Vec<Middleware>,
        mount_prefix: Option<String>,
    ) -> Result<Registered> {
        let compiled = compile(template)?;
        let key = route_key(method, &compiled.base_path_key);
        let normalized_path = compiled.normalized_path;

        let record = RouteRecord {
            method,
            compiled_path: compiled.base_path_key,
            normalized_path: normalized_path.clone(),
            parameter_names: compiled.parameter_names,
            original_template: template.to_string(),
            middleware_chain,
            mount_prefix,
        };

        if let Some(&slot) = self.index.get(&key) {
            let existing = &self.records[slot];
            self.logger.warn(format_args!(
                "There's already a route handler for {} {} (original path: {}), it will be overridden by {}",
                method, normalized_path, existing.original_template, record.original_template
            ));
            self.overrides += 1;
            let replaced = std::mem::replace(&mut self.records[slot], record);
            return Ok(Registered { normalized_path, replaced: Some(replaced) });
        }

        let slot = self.records.len();
        self.trees.entry(method).or_default().insert(&record.compiled_path, slot);
        self.records.push(record);
        self.index.insert(key, slot);
        Ok(Registered { normalized_path, replaced: None })
    }

    /// Resolve a request path. `raw_path` must not carry the query string.
    pub fn lookup(&self, method: HttpMethod, raw_path: &str) -> Option<RouteMatch<'_>> {
        let segments: Vec<&str> = raw_path.split('/').filter(|s| !s.is_empty()).collect();
        let mut values = Vec::new();

        let fallback = (method != HttpMethod::ANY).then_some(HttpMethod::ANY);
        for candidate in std::iter::once(method).chain(fallback) {
            let Some(tree) = self.trees.get(&candidate) else {
                continue;
            };
            values.clear();
            if let Some(slot) = tree.find(&segments, &mut values) {
                return Some(RouteMatch { record: &self.records[slot], values });
            }
        }

        None
    }

    /// Record stored under an exact key, e.g. `GET/user/:value1`
    pub fn get(&self, key: &str) -> Option<&RouteRecord> {
        self.index.get(key).map(|&slot| &self.records[slot])
    }

    /// True when an `ANY /*` route exists; it replaces the not-found fallback
    pub fn has_catch_all(&self) -> bool {
        self.index.contains_key(&route_key(HttpMethod::ANY, "/*"))
    }

    /// Records in registration order
    pub fn records(&self) -> impl Iterator<Item = &RouteRecord> {
        self.records.iter()
    }

    /// Number of overwrites seen so far
    pub fn overrides(&self) -> usize {
        self.overrides
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
