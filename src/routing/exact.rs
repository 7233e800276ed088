//! Exact-path matcher (`PATH`).
//!
//! # Responsibilities
//! - Map literal `{method, path}` pairs to handlers
//! - Serve HEAD from a GET handler when no HEAD handler exists
//! - Tell "path unknown" (no match, 404 upstream) from "method not allowed" (405)
//!
//! # Design Decisions
//! - Keys are `"METHOD PATH"` strings in a sorted `Vec` with a parallel handler
//!   `Vec`; lookups are binary searches, inserts only happen during setup
//! - The `Allow` value for each path is computed at insert time

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::http::context::Context;
use crate::http::handler::SharedHandler;
use crate::http::method::Method;
use crate::http::path::normalize_path;
use crate::routing::matcher::{Bound, HeadOnly, Matcher, MethodNotAllowed, Responder};
use crate::routing::rule::{RouteRule, RuleTarget};
use crate::routing::SetupError;

fn route_key(method: &str, path: &str) -> String {
    format!("{method} {path}")
}

/// `Allow` value in canonical order; GET implies HEAD.
fn allow_header(methods: &BTreeSet<Method>) -> String {
    Method::ALL
        .into_iter()
        .filter(|m| methods.contains(m) || (*m == Method::Head && methods.contains(&Method::Get)))
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

struct PathEntry {
    methods: BTreeSet<Method>,
    allow: Arc<str>,
}

/// Literal path matcher backed by binary search.
pub struct ExactPathMatcher<C> {
    name: String,
    keys: Vec<String>,
    handlers: Vec<SharedHandler<C>>,
    paths: HashMap<String, PathEntry>,
}

impl<C: Context> ExactPathMatcher<C> {
    pub const TYPE_NAME: &'static str = "PATH";

    pub fn new() -> Self {
        Self::named(Self::TYPE_NAME)
    }

    /// A matcher registered under a custom type name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
            handlers: Vec::new(),
            paths: HashMap::new(),
        }
    }

    /// Register one `{method, path}` pair.
    pub fn insert(&mut self, method: Method, path: &str, handler: SharedHandler<C>) -> Result<(), SetupError> {
        let path = normalize_path(path);
        let key = route_key(method.as_str(), path);

        let index = match self.keys.binary_search(&key) {
            Ok(_) => {
                return Err(SetupError::DuplicateRoute {
                    method: method.to_string(),
                    path: path.to_string(),
                })
            }
            Err(index) => index,
        };
        self.keys.insert(index, key);
        self.handlers.insert(index, handler);

        let entry = self.paths.entry(path.to_string()).or_insert_with(|| PathEntry {
            methods: BTreeSet::new(),
            allow: Arc::from(""),
        });
        entry.methods.insert(method);
        entry.allow = Arc::from(allow_header(&entry.methods));
        Ok(())
    }

    /// Resolve a method and raw path.
    pub fn lookup(&self, method: &axum::http::Method, path: &str) -> Option<Responder<C>> {
        let path = normalize_path(path);

        if let Some(handler) = self.find(method.as_str(), path) {
            return Some(Box::new(Bound { handler, params: None }));
        }

        if *method == axum::http::Method::HEAD {
            if let Some(handler) = self.find(Method::Get.as_str(), path) {
                let inner: Responder<C> = Box::new(Bound { handler, params: None });
                return Some(Box::new(HeadOnly { inner }));
            }
        }

        let entry = self.paths.get(path)?;
        Some(Box::new(MethodNotAllowed {
            allow: entry.allow.clone(),
        }))
    }

    fn find(&self, method: &str, path: &str) -> Option<SharedHandler<C>> {
        let key = route_key(method, path);
        self.keys
            .binary_search(&key)
            .ok()
            .map(|index| self.handlers[index].clone())
    }

    /// Number of registered `{method, path}` pairs.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<C: Context> Default for ExactPathMatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for ExactPathMatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExactPathMatcher")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .finish()
    }
}

impl<C: Context> Matcher<C> for ExactPathMatcher<C> {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn add_rule(&mut self, mut rule: RouteRule<C>) -> Result<(), SetupError> {
        let path = match rule.target() {
            RuleTarget::Path(path) => path.clone(),
            other => {
                return Err(SetupError::RuleMismatch {
                    route_type: self.name.clone(),
                    target: format!("{other:?}"),
                })
            }
        };
        let methods = rule.allowed_methods();
        let handler = rule
            .take_handler()
            .ok_or_else(|| SetupError::MissingHandler(path.clone()))?;

        for method in methods {
            self.insert(method, &path, handler.clone())?;
        }
        Ok(())
    }

    fn match_request(&self, ctx: &C) -> Option<Responder<C>> {
        let core = ctx.core();
        self.lookup(core.method(), core.path())
    }
}
