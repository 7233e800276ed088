//! Handler and pipe contracts.
//!
//! A handler is an async callable over a mutable per-request context. Pipes
//! (request filters) share the same shape: they run before the terminal
//! handler and abort the request by returning an error.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::http::error::HttpResult;

/// A boxed, sendable future borrowing from the request context.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Terminal request handler.
pub trait Handler<C>: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, HttpResult>;
}

impl<C, F> Handler<C> for F
where
    F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, HttpResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, HttpResult> {
        self(ctx)
    }
}

/// Shared handler as stored by matchers.
pub type SharedHandler<C> = Arc<dyn Handler<C>>;

/// A request filter. Same contract as a handler; an `Err` stops the chain.
pub type Pipe<C> = SharedHandler<C>;

/// Wrap a closure returning a boxed future as a shared handler.
///
/// ```ignore
/// let hello = handler_fn(|ctx: &mut RequestContext| Box::pin(async move {
///     ctx.text("hello");
///     Ok(())
/// }));
/// ```
pub fn handler_fn<C, F>(f: F) -> SharedHandler<C>
where
    C: 'static,
    F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, HttpResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

struct Composed<C> {
    pipes: Vec<Pipe<C>>,
    handler: SharedHandler<C>,
}

impl<C: Send + 'static> Handler<C> for Composed<C> {
    fn call<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, HttpResult> {
        Box::pin(async move {
            run_pipes(&self.pipes, ctx).await?;
            self.handler.call(ctx).await
        })
    }
}

/// Run pipes in order, then the handler. No pipes returns the handler as is.
pub fn compose<C: Send + 'static>(pipes: Vec<Pipe<C>>, handler: SharedHandler<C>) -> SharedHandler<C> {
    if pipes.is_empty() {
        return handler;
    }
    Arc::new(Composed { pipes, handler })
}

/// Run pipes in registration order, stopping at the first failure.
pub async fn run_pipes<C: Send + 'static>(pipes: &[Pipe<C>], ctx: &mut C) -> HttpResult {
    for pipe in pipes {
        pipe.call(ctx).await?;
    }
    Ok(())
}
