//! Socket-level tests: the real server on a loopback port, driven by reqwest.

use std::time::Duration;

use serde_json::{json, Value};

mod common;
use common::{start_server, test_config, API_KEY};

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_end_to_end_over_tcp() {
    let (addr, shutdown) = start_server(test_config()).await;
    let client = client();

    let res = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.headers()["referrer-policy"], "no-referrer");

    let res = client
        .post(format!("http://{addr}/api/calendar/events/general?source=web"))
        .header("x-api-key", API_KEY)
        .json(&json!({"title": "Quarterly planning", "notes": "<b>bring laptops</b>"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["body"]["title"], "Quarterly planning");
    assert_eq!(body["data"]["body"]["notes"], "&lt;b&gt;bring laptops&lt;&#x2F;b&gt;");
    assert_eq!(body["data"]["query"]["source"], "web");

    let res = client
        .get(format!("http://{addr}/api/tasks"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    shutdown.trigger();
}

#[tokio::test]
async fn test_declared_oversized_body_is_rejected() {
    let mut config = test_config();
    config.payload.max_body_bytes = 128;
    let (addr, shutdown) = start_server(config).await;

    let res = client()
        .post(format!("http://{addr}/api/tasks"))
        .header("x-api-key", API_KEY)
        .json(&json!({"notes": "n".repeat(1024)}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 413);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");

    shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let (addr, shutdown) = start_server(test_config()).await;
    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let result = client()
        .get(format!("http://{addr}/health"))
        .timeout(Duration::from_secs(1))
        .send()
        .await;
    assert!(result.is_err());
}
