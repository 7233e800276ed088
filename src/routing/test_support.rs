//! Helpers shared by routing unit tests.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};

use crate::http::context::RequestContext;
use crate::http::error::HttpResult;
use crate::http::handler::{handler_fn, SharedHandler};
use crate::routing::matcher::Responder;

pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "test.local")
        .body(Body::empty())
        .unwrap()
}

pub fn ctx(method: &str, uri: &str) -> RequestContext {
    RequestContext::from_request(request(method, uri)).unwrap()
}

/// Handler answering with a fixed text body.
pub fn reply(body: &'static str) -> SharedHandler<RequestContext> {
    handler_fn(move |ctx: &mut RequestContext| {
        Box::pin(async move {
            ctx.text(body);
            Ok(())
        })
    })
}

/// Handler echoing the named params as `k=v` pairs sorted by key.
pub fn echo_params() -> SharedHandler<RequestContext> {
    handler_fn(|ctx: &mut RequestContext| {
        Box::pin(async move {
            let mut pairs: Vec<_> = ctx.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            pairs.sort();
            ctx.text(pairs.join("&"));
            Ok(())
        })
    })
}

pub async fn body_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Run a responder and collect what it produced.
pub async fn run(
    responder: Responder<RequestContext>,
    mut ctx: RequestContext,
) -> HttpResult<(StatusCode, HeaderMap, String)> {
    responder.respond(&mut ctx).await?;
    let response = ctx.take_response();
    let (parts, body) = response.into_parts();
    Ok((parts.status, parts.headers, body_string(body).await))
}
