//! Request-time errors.
//!
//! Every failure that happens while a request is being served is carried as
//! an [`HttpError`]. The dispatcher converts it exactly once into a JSON
//! response; nothing below it writes error bodies.
//!
//! # Design Decisions
//! - `expose` decides whether the message reaches the client; 5xx default to hidden
//! - Extra headers (e.g. `Allow`) travel with the error and are copied onto the response
//! - Foreign errors convert into hidden 500s so `?` is safe inside handlers

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use thiserror::Error;

/// Message substituted for hidden errors.
pub const GENERIC_MESSAGE: &str = "Internal Server Error";

/// Result alias used by handlers, pipes and responders.
pub type HttpResult<T = ()> = Result<T, HttpError>;

/// A structured request-time error.
#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
    expose: bool,
    headers: HeaderMap,
}

impl HttpError {
    /// Create an error; the message is exposed for statuses below 500.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            expose: status.as_u16() < 500,
            headers: HeaderMap::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found")
    }

    /// 405 carrying the `Allow` header.
    pub fn method_not_allowed(allow: &str) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
            .with_header(axum::http::header::ALLOW, allow)
    }

    pub fn payload_too_large() -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "Content Too Large")
    }

    pub fn invalid_json() -> Self {
        Self::bad_request("Invalid JSON")
    }

    /// Non-standard 499 used when the client went away mid-request.
    pub fn client_closed() -> Self {
        let status = StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST);
        Self::new(status, "Client Closed Request")
    }

    /// A hidden 500 whose message is kept for logs only.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Override the expose flag.
    pub fn expose(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    /// Attach an extra response header. Invalid values are dropped.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => {
                tracing::warn!(header = %name, "Dropping invalid error header value");
            }
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_exposed(&self) -> bool {
        self.expose
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The message a client is allowed to see.
    pub fn public_message(&self) -> &str {
        if self.expose {
            &self.message
        } else {
            GENERIC_MESSAGE
        }
    }
}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(format!("I/O error: {err}"))
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("Serialization error: {err}"))
    }
}
