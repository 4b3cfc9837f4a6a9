//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceExt;

use calendar_gateway::security::clock::ManualClock;
use calendar_gateway::{AdmissionComponents, GatewayConfig, HttpServer, Shutdown};

pub const API_KEY: &str = "integration-test-key-0123456789";
pub const PEER: &str = "203.0.113.7:40000";

/// Production-mode config with one valid key.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.api_keys = vec![API_KEY.to_string()];
    config
}

pub fn app(config: GatewayConfig) -> Router {
    HttpServer::new(config).unwrap().router()
}

/// Router whose limiters run on a manual clock.
pub fn app_with_clock(config: GatewayConfig) -> (Router, ManualClock) {
    let clock = ManualClock::new();
    let components = AdmissionComponents::with_clock(&config, Arc::new(clock.clone())).unwrap();
    let router = HttpServer::from_parts(config, Arc::new(components)).router();
    (router, clock)
}

/// Build a request as if it arrived from [`PEER`].
pub fn request(method: Method, uri: &str, api_key: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let mut request = builder.body(body).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(PEER.parse::<SocketAddr>().unwrap()));
    request
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    TestResponse { status, headers, body }
}

/// Run the real server on an ephemeral loopback port.
pub async fn start_server(mut config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();

    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, shutdown)
}
