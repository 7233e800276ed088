//! Per-request context.
//!
//! # Responsibilities
//! - Own the request parts for the lifetime of one exchange
//! - Parse the request target against the declared host
//! - Carry route parameters and typed request-local data
//! - Stage the response (status, headers, body) until the dispatcher commits it
//!
//! # Design Decisions
//! - Handlers write into a draft instead of a live socket, so a wrapper can
//!   inspect or drop what the inner handler produced (HEAD, error mapping)
//! - Custom contexts embed a `RequestContext` and implement [`Context`]

use std::collections::HashMap;
use std::fmt;

use axum::body::{Body, Bytes};
use axum::http::{header, Extensions, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri};
use futures_util::StreamExt;
use http_body_util::LengthLimitError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::http::error::{HttpError, HttpResult};

/// Captured route parameters.
pub type Params = HashMap<String, String>;

/// Default cap for [`RequestContext::body_bytes`].
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024;

fn body_error(err: axum::Error) -> HttpError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return HttpError::payload_too_large();
        }
        source = e.source();
    }
    tracing::debug!(error = %err, "Request body aborted");
    HttpError::client_closed()
}

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json; charset=utf-8";

/// Access to the core context from a user-defined context type.
pub trait Context: Send + 'static {
    fn core(&self) -> &RequestContext;
    fn core_mut(&mut self) -> &mut RequestContext;
}

enum Payload {
    Empty,
    Bytes(Bytes),
    Stream(Body),
}

struct ResponseDraft {
    status: StatusCode,
    headers: HeaderMap,
    payload: Payload,
}

/// The default per-request context.
pub struct RequestContext {
    method: axum::http::Method,
    uri: Uri,
    url: Url,
    headers: HeaderMap,
    body: Option<Body>,
    body_limit: usize,
    /// Parameters bound by the matcher that selected this request.
    pub params: Params,
    /// Typed request-local storage for pipes and handlers.
    pub locals: Extensions,
    response: ResponseDraft,
}

impl Context for RequestContext {
    fn core(&self) -> &RequestContext {
        self
    }

    fn core_mut(&mut self) -> &mut RequestContext {
        self
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("params", &self.params)
            .field("status", &self.response.status)
            .finish()
    }
}

impl RequestContext {
    /// Build a context from an incoming request.
    ///
    /// The target is resolved against the `Host` header (or the URI
    /// authority), falling back to `localhost`.
    pub fn from_request(req: Request<Body>) -> HttpResult<Self> {
        let (parts, body) = req.into_parts();
        let url = resolve_url(&parts.uri, &parts.headers)?;

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            url,
            headers: parts.headers,
            body: Some(body),
            body_limit: DEFAULT_BODY_LIMIT,
            params: Params::new(),
            locals: parts.extensions,
            response: ResponseDraft {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                payload: Payload::Empty,
            },
        })
    }

    pub fn method(&self) -> &axum::http::Method {
        &self.method
    }

    /// The raw request target as received.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The normalized, still percent-encoded path.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A request header as UTF-8, if present and valid.
    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// First value of a query-string key.
    pub fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Take the unread request body. Returns `None` on the second call.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    pub fn set_body_limit(&mut self, limit: usize) {
        self.body_limit = limit;
    }

    /// Read the whole body, failing with 413 past `body_limit` bytes.
    ///
    /// A body that was already taken reads as empty. A transport failure
    /// mid-read is reported as 499, unless an outer length limit cut the
    /// stream short, which is still a 413.
    pub async fn body_bytes(&mut self) -> HttpResult<Bytes> {
        let Some(body) = self.body.take() else {
            return Ok(Bytes::new());
        };

        let limit = self.body_limit;
        let mut stream = body.into_data_stream();
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(body_error)?;
            if buf.len() + chunk.len() > limit {
                return Err(HttpError::payload_too_large());
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buf))
    }

    /// Read and deserialize a JSON body; malformed input is a 400.
    pub async fn body_json<T: DeserializeOwned>(&mut self) -> HttpResult<T> {
        let bytes = self.body_bytes().await?;
        serde_json::from_slice(&bytes).map_err(|_| HttpError::invalid_json())
    }

    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.response.status = status;
        self
    }

    pub fn response_status(&self) -> StatusCode {
        self.response.status
    }

    /// Set a response header, replacing any previous value.
    pub fn header<V>(&mut self, name: HeaderName, value: V) -> &mut Self
    where
        V: TryInto<HeaderValue>,
        V::Error: fmt::Display,
    {
        match value.try_into() {
            Ok(value) => {
                self.response.headers.insert(name, value);
            }
            Err(e) => {
                tracing::warn!(header = %name, error = %e, "Dropping invalid response header");
            }
        }
        self
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response.headers
    }

    /// Finish with no body.
    pub fn end(&mut self) {
        self.response.payload = Payload::Empty;
    }

    /// Finish with a complete body.
    pub fn send(&mut self, body: impl Into<Bytes>) {
        self.response.payload = Payload::Bytes(body.into());
    }

    /// Finish with a text body; sets a plain-text content type unless one is set.
    pub fn text(&mut self, body: impl Into<String>) {
        self.default_content_type(TEXT_PLAIN);
        self.send(body.into());
    }

    /// Finish with a JSON body; sets a JSON content type unless one is set.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> HttpResult<()> {
        let body = serde_json::to_vec(value)?;
        self.default_content_type(APPLICATION_JSON);
        self.send(body);
        Ok(())
    }

    /// Finish with a streaming body.
    pub fn stream(&mut self, body: Body) {
        self.response.payload = Payload::Stream(body);
    }

    fn default_content_type(&mut self, value: &'static str) {
        if !self.response.headers.contains_key(header::CONTENT_TYPE) {
            self.response
                .headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
        }
    }

    /// Drop the staged body while keeping status and headers.
    ///
    /// A discarded complete body still reports its length unless the handler
    /// already set `Content-Length`.
    pub(crate) fn discard_body(&mut self) {
        let payload = std::mem::replace(&mut self.response.payload, Payload::Empty);
        if let Payload::Bytes(bytes) = payload {
            if !self.response.headers.contains_key(header::CONTENT_LENGTH) {
                self.response
                    .headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            }
        }
    }

    /// Move the staged response out, leaving an empty 200 behind.
    pub(crate) fn take_response(&mut self) -> Response<Body> {
        let draft = std::mem::replace(
            &mut self.response,
            ResponseDraft {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                payload: Payload::Empty,
            },
        );

        let body = match draft.payload {
            Payload::Empty => Body::empty(),
            Payload::Bytes(bytes) => Body::from(bytes),
            Payload::Stream(body) => body,
        };

        let mut response = Response::new(body);
        *response.status_mut() = draft.status;
        *response.headers_mut() = draft.headers;
        response
    }
}

fn resolve_url(uri: &Uri, headers: &HeaderMap) -> HttpResult<Url> {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");

    let base = Url::parse(&format!("http://{host}"))
        .or_else(|_| Url::parse("http://localhost"))
        .map_err(|e| HttpError::internal(format!("base URL: {e}")))?;

    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    base.join(target)
        .map_err(|_| HttpError::bad_request("Bad Request"))
}
