//! Admission middleware.
//!
//! Bridges axum requests and the synchronous [`AdmissionPipeline`].
//!
//! # Data Flow
//! ```text
//! Request
//!     → resolve client IP (peer or X-Forwarded-For)
//!     → buffer body (bounded), decode JSON / form, decode query
//!     → AdmissionPipeline::admit
//!         Reject  → error envelope
//!         Forward → rebuild body + query from the sanitized envelope,
//!                   attach `Admitted` extension, call downstream
//! ```
//!
//! # Design Decisions
//! - Decode failures are carried into the pipeline instead of answered here,
//!   so the IP checks still run first
//! - The body read is bounded by the configured ceiling

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{
        rejection::RawPathParamsRejection, ConnectInfo, OriginalUri, RawPathParams, Request, State,
    },
    http::{header, uri::PathAndQuery, HeaderMap, HeaderValue, Uri},
    middleware::Next,
    response::Response,
};
use serde_json::{Map, Value};

use crate::error::AdmissionError;
use crate::http::body::{decode_body, encode_body, encode_urlencoded, parse_urlencoded, BodyKind};
use crate::http::request::RequestIdExt;
use crate::http::response::rejection_response;
use crate::pipeline::{
    AdmissionPipeline, Inbound, Outcome, Rejected, RequestContext, RequestEnvelope,
};
use crate::security::access_control::client_ip;

/// State shared by every request passing through one pipeline.
#[derive(Clone)]
pub struct AdmissionState {
    pub pipeline: Arc<AdmissionPipeline>,
    pub max_body_bytes: usize,
    pub trust_proxy: bool,
    pub development: bool,
}

pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = request.request_id();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let (mut parts, body) = request.into_parts();
    let context = RequestContext {
        request_id,
        method: parts.method.clone(),
        path: parts
            .extensions
            .get::<OriginalUri>()
            .map(|OriginalUri(uri)| uri.path().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string()),
        client_ip: client_ip(&parts.headers, peer, state.trust_proxy),
        user_agent: parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let mut decode_error = None;

    let (kind, body) = match read_body(&parts.headers, body, state.max_body_bytes).await {
        Ok(decoded) => decoded,
        Err(e) => {
            decode_error = Some(e);
            (BodyKind::Empty, Value::Null)
        }
    };

    let query = match parts.uri.query().map(parse_urlencoded).transpose() {
        Ok(query) => query.unwrap_or_default(),
        Err(e) => {
            decode_error.get_or_insert(e);
            Map::new()
        }
    };

    let params: Map<String, Value> = params
        .map(|params| {
            params
                .iter()
                .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let inbound = Inbound {
        context,
        headers: parts.headers.clone(),
        envelope: RequestEnvelope::new(body, query, params),
        decode_error,
        identity: None,
    };

    let admitted = match state.pipeline.admit(inbound) {
        Outcome::Forward(admitted) => admitted,
        Outcome::Reject(rejected) => return rejection_response(&rejected, state.development),
    };

    let bytes = match encode_body(kind, &admitted.envelope.body) {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!(request_id = %admitted.context.request_id, error = %error, "Failed to rebuild request");
            return rejection_response(
                &Rejected {
                    context: admitted.context,
                    stage: "forward",
                    error,
                },
                state.development,
            );
        }
    };

    rewrite_query(&mut parts.uri, &admitted.envelope.query);
    parts.headers.remove(header::TRANSFER_ENCODING);
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    if let Some(content_type) = kind.content_type() {
        parts
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    parts.extensions.insert(admitted);

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn read_body(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<(BodyKind, Value), AdmissionError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if let Some(size) = declared.filter(|size| *size > limit) {
        return Err(AdmissionError::PayloadTooLarge { size, limit });
    }

    let bytes = to_bytes(body, limit).await.map_err(|_| AdmissionError::PayloadTooLarge {
        size: declared.unwrap_or(limit + 1),
        limit,
    })?;
    decode_body(headers, &bytes)
}

fn rewrite_query(uri: &mut Uri, query: &Map<String, Value>) {
    let encoded = encode_urlencoded(query);
    let path_and_query = if encoded.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), encoded)
    };

    let mut uri_parts = uri.clone().into_parts();
    match PathAndQuery::try_from(path_and_query) {
        Ok(pq) => uri_parts.path_and_query = Some(pq),
        Err(e) => {
            tracing::warn!(error = %e, "Keeping original query string");
            return;
        }
    }
    if let Ok(rebuilt) = Uri::from_parts(uri_parts) {
        *uri = rebuilt;
    }
}
