//! Request dispatch across registered matchers.
//!
//! # Responsibilities
//! - Hold route types in registration order
//! - Route setup rules to the matcher named by their route type
//! - Per request: build the context, run global pipes, take the first match
//! - Map every error to one JSON response shape
//!
//! # Design Decisions
//! - Built mutably during setup, then shared read-only behind `Arc`
//! - Matchers are trait objects; dispatch never switches on a type tag
//! - Errors are converted once, here; the failing handler's staged
//!   headers are discarded

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Request, Response};
use serde_json::json;

use crate::http::context::{Context, RequestContext, DEFAULT_BODY_LIMIT};
use crate::http::error::{HttpError, HttpResult};
use crate::http::handler::{run_pipes, Pipe};
use crate::observability::metrics;
use crate::routing::matcher::Matcher;
use crate::routing::rule::RouteRule;
use crate::routing::SetupError;

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const APPLICATION_JSON: &str = "application/json; charset=utf-8";

/// Builds the per-request context from the core one.
pub type ContextFactory<C> = Arc<dyn Fn(RequestContext) -> C + Send + Sync>;

/// Ordered matcher registry and request entry point.
pub struct Dispatcher<C = RequestContext> {
    matchers: Vec<Box<dyn Matcher<C>>>,
    by_name: HashMap<String, usize>,
    pipes: Vec<Pipe<C>>,
    factory: ContextFactory<C>,
    body_limit: usize,
}

impl Dispatcher<RequestContext> {
    pub fn new() -> Self {
        Self::with_context(|core| core)
    }
}

impl Default for Dispatcher<RequestContext> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Context> Dispatcher<C> {
    /// A dispatcher whose handlers see a custom context type.
    pub fn with_context(factory: impl Fn(RequestContext) -> C + Send + Sync + 'static) -> Self {
        Self {
            matchers: Vec::new(),
            by_name: HashMap::new(),
            pipes: Vec::new(),
            factory: Arc::new(factory),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Register a route type. Registration order is dispatch priority.
    pub fn use_type(&mut self, matcher: impl Matcher<C> + 'static) -> Result<&mut Self, SetupError> {
        let name = matcher.type_name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(SetupError::DuplicateRouteType(name));
        }
        tracing::debug!(route_type = %name, priority = self.matchers.len(), "Route type registered");
        self.by_name.insert(name, self.matchers.len());
        self.matchers.push(Box::new(matcher));
        Ok(self)
    }

    /// Append pipes that run before matching, for every request.
    pub fn use_global_pipes(&mut self, pipes: impl IntoIterator<Item = Pipe<C>>) -> &mut Self {
        self.pipes.extend(pipes);
        self
    }

    /// Cap applied to `RequestContext::body_bytes` for every request.
    pub fn set_body_limit(&mut self, bytes: usize) -> &mut Self {
        self.body_limit = bytes;
        self
    }

    /// Hand a rule to the matcher registered under its route type.
    pub fn add_rule(&mut self, rule: RouteRule<C>) -> Result<&mut Self, SetupError> {
        let index = *self
            .by_name
            .get(rule.route_type())
            .ok_or_else(|| SetupError::UnknownRouteType(rule.route_type().to_string()))?;
        self.matchers[index].add_rule(rule)?;
        Ok(self)
    }

    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = RouteRule<C>>) -> Result<&mut Self, SetupError> {
        for rule in rules {
            self.add_rule(rule)?;
        }
        Ok(self)
    }

    /// Registered route types in priority order.
    pub fn route_types(&self) -> impl Iterator<Item = &str> {
        self.matchers.iter().map(|m| m.type_name())
    }

    /// Handle one request end to end. Never fails: errors become responses.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = req.method().clone();
        let request_id = req
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let path = req.uri().path().to_string();

        let (outcome, route_type) = match RequestContext::from_request(req) {
            Ok(mut core) => {
                core.set_body_limit(self.body_limit);
                let mut ctx = (self.factory)(core);
                let (result, route_type) = self.dispatch(&mut ctx).await;
                (result.map(|()| ctx.core_mut().take_response()), route_type)
            }
            Err(e) => (Err(e), metrics::UNMATCHED),
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                if e.status().is_server_error() {
                    tracing::error!(request_id = %request_id, method = %method, path = %path, status = %e.status(), error = %e, "Request failed");
                } else {
                    tracing::debug!(request_id = %request_id, method = %method, path = %path, status = %e.status(), error = %e, "Request rejected");
                }
                error_response(&e)
            }
        };

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            path = %path,
            route_type,
            status = response.status().as_u16(),
            "Request handled"
        );
        metrics::record_request(method.as_str(), response.status().as_u16(), route_type, start);
        response
    }

    async fn dispatch(&self, ctx: &mut C) -> (HttpResult, &str) {
        if let Err(e) = run_pipes(&self.pipes, ctx).await {
            return (Err(e), metrics::UNMATCHED);
        }

        for matcher in &self.matchers {
            let Some(responder) = matcher.match_request(ctx) else {
                continue;
            };
            return (responder.respond(ctx).await, matcher.type_name());
        }

        (Err(HttpError::not_found()), metrics::UNMATCHED)
    }
}

impl<C> fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("matchers", &self.matchers)
            .field("pipes", &self.pipes.len())
            .finish()
    }
}

/// `{"error": message}` with the error's status and extra headers.
pub fn error_response(err: &HttpError) -> Response<Body> {
    let body = json!({ "error": err.public_message() }).to_string();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = err.status();

    let headers = response.headers_mut();
    for (name, value) in err.headers() {
        headers.insert(name.clone(), value.clone());
    }
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    response
}
