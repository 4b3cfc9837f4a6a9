//! Response envelopes.
//!
//! # Responsibilities
//! - Turn a pipeline rejection into the uniform JSON error envelope
//! - Add `Retry-After` to rate-limit rejections
//! - Provide the 404 and success envelopes used by the handlers
//!
//! # Design Decisions
//! - The caller only ever sees `AdmissionError::public_message`
//! - Debug detail is attached in development and nowhere else
//!
//! ```text
//! {
//!   "success": false,
//!   "error": { "code", "message", "timestamp", "requestId", "debug"? },
//!   "retryAfter"?: seconds
//! }
//! ```

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::http::request::RequestId;
use crate::pipeline::Rejected;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub timestamp: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

/// Development-only detail.
#[derive(Debug, Serialize)]
pub struct DebugInfo {
    pub detail: String,
    pub stage: &'static str,
    pub path: String,
    pub method: String,
}

/// ISO-8601 UTC timestamp with millisecond precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the error envelope for a rejected request.
pub fn rejection_response(rejected: &Rejected, development: bool) -> Response {
    let error = &rejected.error;
    let context = &rejected.context;

    let debug = development.then(|| DebugInfo {
        detail: error.to_string(),
        stage: rejected.stage,
        path: context.path.clone(),
        method: context.method.to_string(),
    });
    let retry_after = error.retry_after_secs();

    let envelope = ErrorEnvelope {
        success: false,
        error: ErrorBody {
            code: error.code(),
            message: error.public_message(),
            path: None,
            method: None,
            timestamp: timestamp(),
            request_id: context.request_id.to_string(),
            debug,
        },
        retry_after,
    };

    let mut response = (error.status(), Json(envelope)).into_response();
    if let Some(secs) = retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

/// 404 envelope for unknown routes.
pub fn not_found_response(request_id: &RequestId, method: &Method, path: &str) -> Response {
    let envelope = ErrorEnvelope {
        success: false,
        error: ErrorBody {
            code: "NOT_FOUND",
            message: "The requested endpoint does not exist".to_string(),
            path: Some(path.to_string()),
            method: Some(method.to_string()),
            timestamp: timestamp(),
            request_id: request_id.to_string(),
            debug: None,
        },
        retry_after: None,
    };
    (StatusCode::NOT_FOUND, Json(envelope)).into_response()
}

#[derive(Debug, Serialize)]
pub struct SuccessEnvelope<T> {
    pub success: bool,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<SuccessEnvelope<T>> {
    Json(SuccessEnvelope { success: true, data })
}
