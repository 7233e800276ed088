//! Pluggable HTTP routing core with static file serving.
//!
//! A [`Dispatcher`] holds route types (matchers) in priority order:
//! exact paths, segment patterns with typed parameters, and a static file
//! matcher backed by a concurrently refreshed [`StaticIndex`].

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod static_files;

pub use config::schema::ServerConfig;
pub use http::{HttpError, HttpResult, HttpServer, RequestContext};
pub use lifecycle::Shutdown;
pub use routing::{Dispatcher, ExactPathMatcher, PatternTrieMatcher, RouteRule, SetupError, StaticFileMatcher};
pub use static_files::StaticIndex;
