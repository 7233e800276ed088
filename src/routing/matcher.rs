//! The matcher contract and the responders matchers hand back.
//!
//! # Responsibilities
//! - Define [`Matcher`], implemented by every route type
//! - Define [`Responder`], the single-use callable a successful match yields
//! - Provide the shared responders: bound handler, HEAD-only view, 405
//!
//! # Design Decisions
//! - Matching is synchronous and read-only; all I/O happens in the responder
//! - A responder owns what the match captured (params, file path) and is
//!   consumed by the request that produced it

use std::fmt;
use std::sync::Arc;

use crate::http::context::{Context, Params};
use crate::http::error::{HttpError, HttpResult};
use crate::http::handler::{BoxFuture, SharedHandler};
use crate::routing::rule::RouteRule;
use crate::routing::SetupError;

/// A route type registered with the dispatcher.
pub trait Matcher<C: Context>: Send + Sync + fmt::Debug {
    /// Name rules use to address this matcher.
    fn type_name(&self) -> &str;

    /// Register a rule. Called during setup only.
    fn add_rule(&mut self, rule: RouteRule<C>) -> Result<(), SetupError>;

    /// Return a responder if this matcher handles the request.
    fn match_request(&self, ctx: &C) -> Option<Responder<C>>;
}

/// Single-use request handling selected by a matcher.
pub trait Respond<C>: Send {
    fn respond<'a>(self: Box<Self>, ctx: &'a mut C) -> BoxFuture<'a, HttpResult>;
}

pub type Responder<C> = Box<dyn Respond<C>>;

/// Invokes a handler after installing captured parameters.
pub(crate) struct Bound<C> {
    pub handler: SharedHandler<C>,
    pub params: Option<Params>,
}

impl<C: Context> Respond<C> for Bound<C> {
    fn respond<'a>(self: Box<Self>, ctx: &'a mut C) -> BoxFuture<'a, HttpResult> {
        Box::pin(async move {
            if let Some(params) = self.params {
                ctx.core_mut().params = params;
            }
            self.handler.call(ctx).await
        })
    }
}

/// Runs the wrapped responder, then keeps only status and headers.
pub(crate) struct HeadOnly<C> {
    pub inner: Responder<C>,
}

impl<C: Context> Respond<C> for HeadOnly<C> {
    fn respond<'a>(self: Box<Self>, ctx: &'a mut C) -> BoxFuture<'a, HttpResult> {
        Box::pin(async move {
            self.inner.respond(ctx).await?;
            ctx.core_mut().discard_body();
            Ok(())
        })
    }
}

/// Fails with 405 and the precomputed `Allow` list.
pub(crate) struct MethodNotAllowed {
    pub allow: Arc<str>,
}

impl<C: Context> Respond<C> for MethodNotAllowed {
    fn respond<'a>(self: Box<Self>, _ctx: &'a mut C) -> BoxFuture<'a, HttpResult> {
        Box::pin(async move { Err(HttpError::method_not_allowed(&self.allow)) })
    }
}
