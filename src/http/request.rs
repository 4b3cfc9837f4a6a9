//! Request identification.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for every request
//! - Stamp it on the request before any other layer sees it
//! - Mirror it onto the response
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A client-supplied `X-Request-ID` is replaced, never trusted

use std::fmt;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use tower_http::request_id::PropagateRequestIdLayer;
use tower_http::set_header::SetRequestHeaderLayer;
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation identifier for one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the request ID stamped by [`request_id_layers`].
pub trait RequestIdExt {
    fn request_id(&self) -> RequestId;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> RequestId {
        self.headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(|v| RequestId(v.to_string()))
            .unwrap_or_else(RequestId::generate)
    }
}

type StampFn = fn(&Request<Body>) -> Option<HeaderValue>;

fn stamp(_request: &Request<Body>) -> Option<HeaderValue> {
    HeaderValue::from_str(RequestId::generate().as_str()).ok()
}

/// Layer that overwrites `X-Request-ID` with a fresh UUID.
pub fn set_request_id_layer() -> SetRequestHeaderLayer<StampFn> {
    SetRequestHeaderLayer::overriding(X_REQUEST_ID.clone(), stamp as StampFn)
}

/// Layer that copies the request's `X-Request-ID` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID.clone())
}
