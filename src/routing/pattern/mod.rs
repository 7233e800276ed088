//! Pattern trie matcher (`PATTERN`).
//!
//! # Responsibilities
//! - Compile `/static/:param(re)/*wildcard` patterns into a segment trie
//! - Match percent-decoded request segments with backtracking
//! - Bind captured parameters onto the request context
//!
//! # Matching Policy
//! ```text
//! at each node, for the current segment:
//!     1. static child with the same text   → recurse, return on success
//!     2. param child whose constraint holds → bind, recurse, unbind on failure
//!     3. wildcard child                     → bind the rest joined by '/'
//! ```
//! Registration order never changes priority.
//!
//! # Design Decisions
//! - Bindings live on a stack owned by one lookup; nothing is visible to the
//!   request until the whole path matched
//! - One param edge and one wildcard edge per node; a second rule using a
//!   different name or constraint at the same position is a setup error
//! - A decode failure in any segment fails the match

mod constraint;
mod parse;
mod trie;

use std::fmt;

pub use constraint::Constraint;
pub use parse::DEFAULT_WILDCARD;

use crate::http::context::Context;
use crate::http::method::Method;
use crate::http::path::{decode_segment, normalize_path};
use crate::routing::matcher::{Bound, HeadOnly, Matcher, Responder};
use crate::routing::rule::{RouteRule, RuleTarget};
use crate::routing::SetupError;

use parse::parse_pattern;
use trie::{Hit, Node};

/// Trie-backed pattern matcher.
pub struct PatternTrieMatcher<C> {
    name: String,
    root: Node<C>,
    patterns: Vec<String>,
}

impl<C: Context> PatternTrieMatcher<C> {
    pub const TYPE_NAME: &'static str = "PATTERN";

    pub fn new() -> Self {
        Self::named(Self::TYPE_NAME)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: Node::default(),
            patterns: Vec::new(),
        }
    }

    /// Find the handler and bindings for a method and raw path.
    fn find(&self, method: &axum::http::Method, path: &str) -> Option<Hit<C>> {
        let method = Method::from_http(method);
        let path = normalize_path(path);

        let segments = if path == "/" {
            Vec::new()
        } else {
            path.strip_prefix('/')
                .unwrap_or(path)
                .split('/')
                .map(decode_segment)
                .collect::<Option<Vec<_>>>()?
        };

        self.root.lookup(method, &segments)
    }

    /// Registered patterns in registration order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl<C: Context> Default for PatternTrieMatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for PatternTrieMatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternTrieMatcher")
            .field("name", &self.name)
            .field("patterns", &self.patterns)
            .finish()
    }
}

impl<C: Context> Matcher<C> for PatternTrieMatcher<C> {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn add_rule(&mut self, mut rule: RouteRule<C>) -> Result<(), SetupError> {
        let pattern = match rule.target() {
            RuleTarget::Pattern(pattern) => pattern.clone(),
            other => {
                return Err(SetupError::RuleMismatch {
                    route_type: self.name.clone(),
                    target: format!("{other:?}"),
                })
            }
        };
        let tokens = parse_pattern(&pattern, rule.constraints())?;
        let methods = rule.allowed_methods();
        let handler = rule
            .take_handler()
            .ok_or_else(|| SetupError::MissingHandler(pattern.clone()))?;

        for method in methods {
            self.root.insert(&pattern, &tokens, method, handler.clone())?;
        }
        self.patterns.push(pattern);
        Ok(())
    }

    fn match_request(&self, ctx: &C) -> Option<Responder<C>> {
        let core = ctx.core();
        let hit = self.find(core.method(), core.path())?;

        let params = if hit.params.is_empty() { None } else { Some(hit.params) };
        let bound: Responder<C> = Box::new(Bound {
            handler: hit.handler,
            params,
        });
        if hit.head_fallback {
            Some(Box::new(HeadOnly { inner: bound }))
        } else {
            Some(bound)
        }
    }
}
