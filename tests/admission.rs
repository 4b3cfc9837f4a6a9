//! In-process admission tests driving the full router with `oneshot`.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;

use calendar_gateway::config::Environment;

mod common;
use common::{app, app_with_clock, request, send, test_config, API_KEY};

#[tokio::test]
async fn test_health_bypasses_admission() {
    let app = app(test_config());
    let res = send(&app, request(Method::GET, "/health", None, None)).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "OK");
    assert_eq!(res.headers[header::X_FRAME_OPTIONS], "DENY");
    assert!(res.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_root_banner_needs_no_key() {
    let app = app(test_config());
    let res = send(&app, request(Method::GET, "/", None, None)).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "Calendar API is running!");
    assert_eq!(res.body["security"], "enabled");
}

#[tokio::test]
async fn test_missing_and_invalid_keys_are_401() {
    let app = app(test_config());

    let res = send(&app, request(Method::GET, "/api/calendar/events", None, None)).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["success"], false);
    assert_eq!(res.body["error"]["code"], "MISSING_CREDENTIAL");
    assert_eq!(
        res.body["error"]["requestId"],
        res.headers["x-request-id"].to_str().unwrap()
    );

    let res = send(&app, request(Method::GET, "/api/calendar/events", Some("wrong"), None)).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"]["code"], "INVALID_CREDENTIAL");
}

#[tokio::test]
async fn test_bearer_token_is_accepted() {
    let app = app(test_config());
    let mut req = request(Method::GET, "/api/tasks", None, None);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {API_KEY}").parse().unwrap(),
    );

    let res = send(&app, req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["apiKey"], "integrat***");
}

#[tokio::test]
async fn test_active_content_is_neutralized_before_forwarding() {
    let app = app(test_config());
    let body = json!({
        "title": "<script>alert(1)</script>Daily standup",
        "description": "Bring <b>notes</b> & coffee",
        "link": "javascript:alert(1)",
        "attendees": [{"email": "a@example.com", "note": "<img src=x onerror=alert(1)>"}]
    });

    let res = send(
        &app,
        request(Method::POST, "/api/calendar/events/general", Some(API_KEY), Some(body)),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    let forwarded = &res.body["data"]["body"];
    let title = forwarded["title"].as_str().unwrap();
    assert!(!title.contains("<script"));
    assert!(title.ends_with("Daily standup"));
    assert_eq!(forwarded["description"], "Bring &lt;b&gt;notes&lt;&#x2F;b&gt; &amp; coffee");
    assert_eq!(forwarded["link"], "alert(1)");
    let note = forwarded["attendees"][0]["note"].as_str().unwrap();
    assert!(!note.contains('<'));
    assert!(!note.to_lowercase().contains("onerror="));
}

#[tokio::test]
async fn test_sql_injection_on_write_is_rejected() {
    let app = app(test_config());
    let res = send(
        &app,
        request(
            Method::POST,
            "/api/calendar/events/general",
            Some(API_KEY),
            Some(json!({"title": "x' OR 1=1"})),
        ),
    )
    .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"]["code"], "SUSPICIOUS_CONTENT");
    assert_eq!(
        res.body["error"]["message"],
        "Request contains potentially malicious content"
    );
    assert!(!res.body.to_string().contains("OR 1=1"));
}

#[tokio::test]
async fn test_injection_runs_before_authentication() {
    let app = app(test_config());
    let res = send(
        &app,
        request(
            Method::PUT,
            "/api/tasks/t-1",
            None,
            Some(json!({"title": "'; DROP TABLE users; --"})),
        ),
    )
    .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"]["code"], "SUSPICIOUS_CONTENT");
}

#[tokio::test]
async fn test_ordinary_calendar_text_is_admitted() {
    let app = app(test_config());
    let body = json!({
        "title": "meeting",
        "description": "Select a room from the list, then update the agenda",
        "location": "Room 4 - 2nd floor"
    });

    let res = send(
        &app,
        request(Method::POST, "/api/calendar/events/private", Some(API_KEY), Some(body)),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["body"]["title"], "meeting");
}

#[tokio::test]
async fn test_reads_are_not_scanned_for_injection() {
    let app = app(test_config());
    let res = send(
        &app,
        request(
            Method::GET,
            "/api/calendar/events?q=SELECT%20*%20FROM%20users",
            Some(API_KEY),
            None,
        ),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["query"]["q"], "SELECT * FROM users");
}

#[tokio::test]
async fn test_path_params_reach_the_envelope() {
    let app = app(test_config());
    let res = send(
        &app,
        request(
            Method::PUT,
            "/api/calendar/events/evt-42",
            Some(API_KEY),
            Some(json!({"title": "Moved"})),
        ),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["params"]["eventId"], "evt-42");
    assert_eq!(res.body["data"]["path"], "/api/calendar/events/evt-42");
}

#[tokio::test]
async fn test_form_bodies_are_decoded_and_sanitized() {
    let app = app(test_config());
    let mut req = Request::builder()
        .method(Method::POST)
        .uri("/api/tasks")
        .header("x-api-key", API_KEY)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("title=Stand+up&notes=%3Cb%3Ehi%3C%2Fb%3E"))
        .unwrap();
    req.extensions_mut().insert(axum::extract::ConnectInfo(
        common::PEER.parse::<std::net::SocketAddr>().unwrap(),
    ));

    let res = send(&app, req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["body"]["title"], "Stand up");
    assert_eq!(res.body["data"]["body"]["notes"], "&lt;b&gt;hi&lt;&#x2F;b&gt;");
}

#[tokio::test]
async fn test_key_rate_limit_and_recovery() {
    let mut config = test_config();
    config.key_rate_limit.max_requests = 3;
    config.key_rate_limit.window_secs = 60;
    let (app, clock) = app_with_clock(config);

    for _ in 0..3 {
        let res = send(&app, request(Method::GET, "/api/tasks", Some(API_KEY), None)).await;
        assert_eq!(res.status, StatusCode::OK);
    }

    let res = send(&app, request(Method::GET, "/api/tasks", Some(API_KEY), None)).await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.body["error"]["code"], "RATE_LIMITED");
    assert_eq!(res.body["retryAfter"], 60);
    assert_eq!(res.headers[header::RETRY_AFTER], "60");
    assert_eq!(
        res.body["error"]["message"],
        "API key rate limit exceeded. Maximum 3 requests per 1 minutes."
    );

    clock.advance(Duration::from_secs(60));
    let res = send(&app, request(Method::GET, "/api/tasks", Some(API_KEY), None)).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_ip_rate_limit_applies_before_authentication() {
    let mut config = test_config();
    config.ip_rate_limit.max_requests = 2;
    let (app, _clock) = app_with_clock(config);

    for _ in 0..2 {
        let res = send(&app, request(Method::GET, "/api/tasks", None, None)).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }
    let res = send(&app, request(Method::GET, "/api/tasks", None, None)).await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        res.body["error"]["message"],
        "Too many requests from this IP, please try again later."
    );

    // Health checks are exempt.
    let res = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_payload_limits() {
    let mut config = test_config();
    config.payload.max_body_bytes = 64;
    config.payload.max_query_params = 2;
    config.payload.max_string_length = 10;
    let app = app(config);

    let res = send(
        &app,
        request(
            Method::POST,
            "/api/tasks",
            Some(API_KEY),
            Some(json!({"notes": "x".repeat(100)})),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(res.body["error"]["code"], "PAYLOAD_TOO_LARGE");

    let res = send(
        &app,
        request(Method::GET, "/api/tasks/list?a=1&b=2&c=3", Some(API_KEY), None),
    )
    .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"]["code"], "TOO_MANY_PARAMETERS");

    let res = send(
        &app,
        request(Method::POST, "/api/tasks", Some(API_KEY), Some(json!({"t": "a".repeat(11)}))),
    )
    .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"]["code"], "STRING_TOO_LONG");
}

#[tokio::test]
async fn test_malformed_json_and_debug_detail() {
    let bad_json = || {
        let mut req = Request::builder()
            .method(Method::POST)
            .uri("/api/tasks")
            .header("x-api-key", API_KEY)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"title\": "))
            .unwrap();
        req.extensions_mut().insert(axum::extract::ConnectInfo(
            common::PEER.parse::<std::net::SocketAddr>().unwrap(),
        ));
        req
    };

    let res = send(&app(test_config()), bad_json()).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"]["code"], "MALFORMED_INPUT");
    assert!(res.body["error"].get("debug").is_none());

    let mut config = test_config();
    config.environment = Environment::Development;
    let res = send(&app(config), bad_json()).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"]["debug"]["stage"], "payload_guard");
    assert_eq!(res.body["error"]["debug"]["method"], "POST");
}

#[tokio::test]
async fn test_unknown_routes() {
    let app = app(test_config());

    let res = send(&app, request(Method::GET, "/nope", None, None)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"]["code"], "NOT_FOUND");
    assert_eq!(res.body["error"]["path"], "/nope");
    assert_eq!(res.body["error"]["method"], "GET");

    let res = send(&app, request(Method::GET, "/api/nope", None, None)).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = send(&app, request(Method::GET, "/api/nope", Some(API_KEY), None)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"]["path"], "/api/nope");
}

#[tokio::test]
async fn test_ip_allow_list_enforced_outside_development() {
    let mut config = test_config();
    config.access.allowed_ips = vec!["198.51.100.1".into()];

    let res = send(
        &app(config.clone()),
        request(Method::GET, "/api/tasks", Some(API_KEY), None),
    )
    .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["error"]["code"], "IP_NOT_ALLOWED");

    config.environment = Environment::Development;
    let res = send(&app(config), request(Method::GET, "/api/tasks", Some(API_KEY), None)).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_trust_proxy_uses_forwarded_address() {
    let mut config = test_config();
    config.access.allowed_ips = vec!["198.51.100.1".into()];
    config.access.trust_proxy = true;
    let app = app(config);

    let mut req = request(Method::GET, "/api/tasks", Some(API_KEY), None);
    req.headers_mut()
        .insert("x-forwarded-for", "10.9.9.9, 198.51.100.1".parse().unwrap());
    let res = send(&app, req).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_client_request_id_is_replaced() {
    let app = app(test_config());
    let mut req = request(Method::GET, "/health", None, None);
    req.headers_mut()
        .insert("x-request-id", "client-chosen".parse().unwrap());

    let res = send(&app, req).await;
    let id = res.headers["x-request-id"].to_str().unwrap();
    assert_ne!(id, "client-chosen");
    assert!(uuid::Uuid::parse_str(id).is_ok());
}
