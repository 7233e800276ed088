//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum, tower-http layers)
//!     → context.rs (RequestContext built from the request)
//!     → routing::Dispatcher (pipes, matchers, handlers)
//!     → context.rs (staged response committed)
//!     → error.rs (failures mapped once to JSON)
//! ```

pub mod context;
pub mod error;
pub mod handler;
pub mod method;
pub mod path;
pub mod server;

pub use context::{Context, Params, RequestContext};
pub use error::{HttpError, HttpResult};
pub use handler::{compose, handler_fn, BoxFuture, Handler, Pipe, SharedHandler};
pub use method::Method;
pub use server::HttpServer;
