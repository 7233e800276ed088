//! Route rules.
//!
//! A rule names the matcher it belongs to (its route type), carries the
//! matcher-specific target, and the common `methods` and `pipes` options.
//! Rules are built during setup and consumed by `Matcher::add_rule`.

use std::collections::HashMap;
use std::fmt;

use crate::http::context::Context;
use crate::http::handler::{compose, Pipe, SharedHandler};
use crate::http::method::Method;
use crate::routing::exact::ExactPathMatcher;
use crate::routing::pattern::{Constraint, PatternTrieMatcher};
use crate::routing::static_route::StaticFileMatcher;

/// Matcher-specific part of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    /// Literal path for the exact matcher.
    Path(String),
    /// Segment pattern for the trie matcher.
    Pattern(String),
    /// Static file serving; no target of its own.
    Static,
}

/// A route registration.
pub struct RouteRule<C> {
    route_type: String,
    target: RuleTarget,
    methods: Option<Vec<Method>>,
    handler: Option<SharedHandler<C>>,
    pipes: Vec<Pipe<C>>,
    constraints: HashMap<String, Constraint>,
}

impl<C: Context> RouteRule<C> {
    fn new(route_type: &str, target: RuleTarget, handler: Option<SharedHandler<C>>) -> Self {
        Self {
            route_type: route_type.to_string(),
            target,
            methods: None,
            handler,
            pipes: Vec::new(),
            constraints: HashMap::new(),
        }
    }

    /// A literal path rule for the `PATH` matcher.
    pub fn path(path: impl Into<String>, handler: SharedHandler<C>) -> Self {
        Self::new(ExactPathMatcher::<C>::TYPE_NAME, RuleTarget::Path(path.into()), Some(handler))
    }

    /// A segment pattern rule for the `PATTERN` matcher.
    pub fn pattern(pattern: impl Into<String>, handler: SharedHandler<C>) -> Self {
        Self::new(
            PatternTrieMatcher::<C>::TYPE_NAME,
            RuleTarget::Pattern(pattern.into()),
            Some(handler),
        )
    }

    /// A rule for the `STATIC` matcher.
    pub fn static_files() -> Self {
        Self::new(StaticFileMatcher::<C>::TYPE_NAME, RuleTarget::Static, None)
    }

    /// Address a matcher registered under a different type name.
    pub fn on(mut self, route_type: impl Into<String>) -> Self {
        self.route_type = route_type.into();
        self
    }

    /// Restrict the rule to these methods.
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    /// Append a per-rule pipe.
    pub fn pipe(mut self, pipe: Pipe<C>) -> Self {
        self.pipes.push(pipe);
        self
    }

    /// Constrain a pattern parameter. Inline `:name(regex)` takes precedence.
    pub fn constraint(mut self, param: impl Into<String>, constraint: Constraint) -> Self {
        self.constraints.insert(param.into(), constraint);
        self
    }

    pub fn route_type(&self) -> &str {
        &self.route_type
    }

    pub fn target(&self) -> &RuleTarget {
        &self.target
    }

    /// Methods passed to [`RouteRule::methods`], if any.
    pub fn declared_methods(&self) -> Option<&[Method]> {
        self.methods.as_deref()
    }

    /// Declared methods, defaulting to all seven.
    pub fn allowed_methods(&self) -> Vec<Method> {
        match &self.methods {
            Some(methods) => methods.clone(),
            None => Method::ALL.to_vec(),
        }
    }

    pub fn constraints(&self) -> &HashMap<String, Constraint> {
        &self.constraints
    }

    /// The handler wrapped with this rule's pipes.
    pub(crate) fn take_handler(&mut self) -> Option<SharedHandler<C>> {
        let handler = self.handler.take()?;
        Some(compose(std::mem::take(&mut self.pipes), handler))
    }

    pub(crate) fn take_pipes(&mut self) -> Vec<Pipe<C>> {
        std::mem::take(&mut self.pipes)
    }
}

impl<C> fmt::Debug for RouteRule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRule")
            .field("route_type", &self.route_type)
            .field("target", &self.target)
            .field("methods", &self.methods)
            .field("pipes", &self.pipes.len())
            .field("constraints", &self.constraints.keys().collect::<Vec<_>>())
            .finish()
    }
}
