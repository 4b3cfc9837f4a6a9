//! Route handlers.
//!
//! `/` and `/health` are served by the gateway itself. Everything under
//! `/api` goes to a downstream router, which by default echoes the admitted
//! request back in the success envelope.

use axum::{
    extract::{OriginalUri, Request},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde_json::{json, Value};

use crate::http::request::RequestIdExt;
use crate::http::response::{not_found_response, success, timestamp};
use crate::pipeline::Admitted;

/// Service banner.
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Calendar API is running!",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": timestamp(),
        "security": "enabled",
    }))
}

/// Liveness check. Not subject to admission.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Server is healthy",
        "timestamp": timestamp(),
    }))
}

/// Fallback for unknown routes.
pub async fn not_found(request: Request) -> Response {
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    tracing::warn!(method = %request.method(), path = %path, "No route matched");
    not_found_response(&request.request_id(), request.method(), &path)
}

async fn echo(Extension(admitted): Extension<Admitted>) -> Response {
    success(json!({
        "requestId": admitted.context.request_id.as_str(),
        "method": admitted.context.method.as_str(),
        "path": admitted.context.path,
        "apiKey": admitted.identity.as_ref().map(|identity| identity.masked()),
        "body": admitted.envelope.body,
        "query": admitted.envelope.query,
        "params": admitted.envelope.params,
    }))
    .into_response()
}

/// Default downstream for `/api`: the calendar and task routes, echoing the
/// sanitized request.
pub fn echo_router() -> Router {
    Router::new()
        .route("/calendar/events", get(echo))
        .route("/calendar/events/general", post(echo))
        .route("/calendar/events/private", post(echo))
        .route("/calendar/events/{eventId}", put(echo).delete(echo))
        .route("/tasks", get(echo).post(echo))
        .route("/tasks/list", get(echo))
        .route("/tasks/{taskId}", put(echo).delete(echo))
}
