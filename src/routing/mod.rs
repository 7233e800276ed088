//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Setup (single-threaded):
//!     RouteRule { route_type, target, methods, pipes }
//!     → dispatcher.rs (look up matcher by route_type)
//!     → exact.rs | pattern/ | static_route.rs (compile into tables/trie)
//!     → Dispatcher frozen behind Arc
//!
//! Per request:
//!     RequestContext
//!     → dispatcher.rs (global pipes)
//!     → matchers in registration order
//!     → first Responder wins, else 404
//!     → errors mapped once to JSON
//! ```
//!
//! # Design Decisions
//! - Route types are trait objects behind one `Matcher` contract
//! - Registration order is dispatch priority
//! - Setup mistakes are `SetupError`s and never reach request time

pub mod dispatcher;
pub mod exact;
pub mod matcher;
pub mod pattern;
pub mod rule;
pub mod static_route;

#[cfg(test)]
pub(crate) mod test_support;

use thiserror::Error;

pub use dispatcher::Dispatcher;
pub use exact::ExactPathMatcher;
pub use matcher::{Matcher, Respond, Responder};
pub use pattern::{Constraint, PatternTrieMatcher};
pub use rule::{RouteRule, RuleTarget};
pub use static_route::StaticFileMatcher;

/// Configuration errors raised while registering matchers and rules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("Route type \"{0}\" is not registered")]
    UnknownRouteType(String),

    #[error("Route type \"{0}\" is already registered")]
    DuplicateRouteType(String),

    #[error("Duplicate route {method} {path}")]
    DuplicateRoute { method: String, path: String },

    #[error("Duplicate handler for method {method} in pattern {pattern}")]
    DuplicateHandler { method: String, pattern: String },

    #[error("Wildcard must be the last segment: {0}")]
    WildcardNotLast(String),

    #[error("Invalid param segment: {0}")]
    InvalidParamSegment(String),

    #[error("Invalid constraint for param {param}: {reason}")]
    InvalidConstraint { param: String, reason: String },

    #[error("Conflicting {kind} at {pattern}: {existing} vs {new}")]
    ConflictingSegment {
        kind: &'static str,
        pattern: String,
        existing: String,
        new: String,
    },

    #[error("Route type \"{route_type}\" does not accept {target} rules")]
    RuleMismatch { route_type: String, target: String },

    #[error("Rule for {0} has no handler")]
    MissingHandler(String),

    #[error("Static rules only serve GET and HEAD, got {0}")]
    UnsupportedMethod(String),

    #[error("Route type \"{0}\" accepts a single rule")]
    DuplicateRule(String),
}
