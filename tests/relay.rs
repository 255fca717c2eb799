//! End-to-end tests for the relay endpoint.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};
use stream_relay::config::RelayConfig;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

mod common;

const SSE_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
    Content-Type: text/event-stream\r\n\
    Connection: close\r\n\
    \r\n\
    data: one\n\ndata: two\n\n";

#[tokio::test]
async fn test_happy_path_relays_event_stream() {
    let (upstream, mut captured) = common::spawn_fixed_upstream(SSE_RESPONSE).await;
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;

    let res = common::client()
        .post(format!("http://{relay}/proxy"))
        .json(&json!({
            "url": format!("http://{upstream}/stream"),
            "method": "POST",
            "body": {"q": 1},
        }))
        .send()
        .await
        .expect("relay unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/event-stream");
    assert_eq!(res.headers()["cache-control"], "no-cache, no-transform");
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "data: one\n\ndata: two\n\n");

    let request = captured.recv().await.unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/stream");
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("accept"), Some("*/*"));
    assert_eq!(serde_json::from_str::<Value>(&request.body).unwrap(), json!({"q": 1}));

    shutdown.trigger();
}

#[tokio::test]
async fn test_status_and_content_type_propagate() {
    let (upstream, _captured) = common::spawn_fixed_upstream(
        "HTTP/1.1 404 Not Found\r\nContent-Length: 8\r\nConnection: close\r\n\r\nmissing\n",
    )
    .await;
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;

    let res = common::client()
        .post(format!("http://{relay}/proxy"))
        .json(&json!({"url": format!("http://{upstream}/nope"), "method": "GET"}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.headers()["content-type"], "application/octet-stream");
    assert_eq!(res.text().await.unwrap(), "missing\n");

    shutdown.trigger();
}

#[tokio::test]
async fn test_json_content_type_is_verbatim() {
    let (upstream, _captured) = common::spawn_fixed_upstream(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json; charset=utf-8\r\nConnection: close\r\n\r\n{\"a\":1}",
    )
    .await;
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;

    let res = common::client()
        .post(format!("http://{relay}/proxy"))
        .json(&json!({"url": format!("http://{upstream}/")}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.headers()["content-type"], "application/json; charset=utf-8");
    assert_eq!(res.text().await.unwrap(), "{\"a\":1}\n");

    shutdown.trigger();
}

#[tokio::test]
async fn test_method_dispatch_and_body_encoding() {
    let (upstream, mut captured) =
        common::spawn_fixed_upstream("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;
    let client = common::client();
    let url = format!("http://{upstream}/resource");

    let res = client
        .post(format!("http://{relay}/proxy"))
        .json(&json!({"url": url, "method": "get", "body": "ignored"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let request = captured.recv().await.unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.body, "");

    client
        .post(format!("http://{relay}/proxy"))
        .json(&json!({"url": url, "method": "patch", "body": "x=1"}))
        .send()
        .await
        .unwrap();
    let request = captured.recv().await.unwrap();
    assert_eq!(request.method, "PATCH");
    assert_eq!(request.body, "x=1");
    assert_eq!(request.header("content-type"), None);

    client
        .post(format!("http://{relay}/proxy"))
        .json(&json!({
            "url": url,
            "method": "PUT",
            "headers": {"Content-Type": "text/plain"},
            "body": {"keep": "caller type"},
        }))
        .send()
        .await
        .unwrap();
    let request = captured.recv().await.unwrap();
    assert_eq!(request.method, "PUT");
    assert_eq!(request.header("content-type"), Some("text/plain"));
    assert_eq!(request.body, r#"{"keep":"caller type"}"#);

    shutdown.trigger();
}

#[tokio::test]
async fn test_hop_by_hop_headers_not_forwarded() {
    let (upstream, mut captured) =
        common::spawn_fixed_upstream("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;

    common::client()
        .post(format!("http://{relay}/proxy"))
        .json(&json!({
            "url": format!("http://{upstream}/"),
            "headers": {
                "Host": "evil.example",
                "Proxy-Authorization": "Basic abc",
                "Upgrade": "websocket",
                "Authorization": "Bearer t",
                "X-Custom": "1",
            },
        }))
        .send()
        .await
        .unwrap();

    let request = captured.recv().await.unwrap();
    assert_eq!(request.header("host"), Some(upstream.to_string().as_str()));
    assert_eq!(request.header("proxy-authorization"), None);
    assert_eq!(request.header("upgrade"), None);
    assert_eq!(request.header("authorization"), Some("Bearer t"));
    assert_eq!(request.header("x-custom"), Some("1"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_non_utf8_body_is_relayed_byte_for_byte() {
    let (upstream, _captured) = common::spawn_upstream(|mut socket| async move {
        let _ = socket
            .write_all(
                b"HTTP/1.1 200 OK\r\n\
                  Content-Type: text/plain; charset=iso-8859-1\r\n\
                  Content-Length: 8\r\n\
                  Connection: close\r\n\
                  \r\n\
                  caf\xe9\nok\n",
            )
            .await;
    })
    .await;
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;

    let res = common::client()
        .post(format!("http://{relay}/proxy"))
        .json(&json!({"url": format!("http://{upstream}/latin1"), "method": "GET"}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/plain; charset=iso-8859-1");
    assert_eq!(&res.bytes().await.unwrap()[..], b"caf\xe9\nok\n");

    shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_descriptor_is_json_413() {
    let mut config = RelayConfig::default();
    config.limits.max_body_size = 32;
    let (relay, shutdown) = common::start_relay(config).await;

    let res = common::client()
        .post(format!("http://{relay}/proxy"))
        .json(&json!({"url": "http://127.0.0.1:1/", "body": "x".repeat(256)}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "payload_too_large");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_upstream_is_502() {
    let target = common::closed_addr().await;
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;

    let res = common::client()
        .post(format!("http://{relay}/proxy"))
        .json(&json!({"url": format!("http://{target}/stream")}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(res.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "upstream_connection_failed");
    assert!(!body["detail"].as_str().unwrap().is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn test_mid_stream_failure_emits_proxy_error_event() {
    let (upstream, _captured) = common::spawn_upstream(|mut socket| async move {
        let _ = socket
            .write_all(
                b"HTTP/1.1 200 OK\r\n\
                  Content-Type: text/event-stream\r\n\
                  Content-Length: 1000\r\n\
                  \r\n\
                  data: one\n",
            )
            .await;
        let _ = socket.flush().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(socket);
    })
    .await;
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;

    let res = common::client()
        .post(format!("http://{relay}/proxy"))
        .json(&json!({"url": format!("http://{upstream}/stream")}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let text = res.text().await.unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("data: one"));
    assert_eq!(lines.next(), Some("event: proxy_error"));
    let data = lines.next().unwrap().strip_prefix("data: ").unwrap();
    let payload: Value = serde_json::from_str(data).unwrap();
    assert_eq!(payload["error"], "upstream_stream_failed");

    shutdown.trigger();
}

#[tokio::test]
async fn test_client_disconnect_releases_upstream() {
    let (released_tx, mut released_rx) = mpsc::unbounded_channel::<()>();
    let (upstream, _captured) = common::spawn_upstream(move |mut socket| {
        let released_tx = released_tx.clone();
        async move {
            if socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n")
                .await
                .is_err()
            {
                return;
            }
            loop {
                if socket.write_all(b"data: tick\n\n").await.is_err() {
                    let _ = released_tx.send(());
                    return;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        }
    })
    .await;
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;

    let mut res = common::client()
        .post(format!("http://{relay}/proxy"))
        .json(&json!({"url": format!("http://{upstream}/stream")}))
        .send()
        .await
        .unwrap();
    let first = res.chunk().await.unwrap().unwrap();
    assert!(first.starts_with(b"data: tick"));
    drop(res);

    let released = tokio::time::timeout(Duration::from_secs(10), released_rx.recv()).await;
    assert!(matches!(released, Ok(Some(()))), "upstream connection was not released");

    shutdown.trigger();
}

#[tokio::test]
async fn test_malformed_body_returns_bounded_snippet() {
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;

    let res = common::client()
        .post(format!("http://{relay}/proxy"))
        .header("content-type", "application/json")
        .body("<html>".repeat(2_000))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_descriptor");
    let snippet = body["debug_raw_snippet"].as_str().unwrap();
    assert_eq!(snippet.len(), 4096);
    assert!(snippet.starts_with("<html>"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_missing_url_is_400() {
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;

    let res = common::client()
        .post(format!("http://{relay}/proxy"))
        .json(&json!({"method": "POST", "headers": {"Accept": "text/event-stream"}}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_target");

    shutdown.trigger();
}

#[tokio::test]
async fn test_cors_preflight() {
    let (relay, shutdown) = common::start_relay(RelayConfig::default()).await;

    let res = common::client()
        .request(reqwest::Method::OPTIONS, format!("http://{relay}/proxy"))
        .header("origin", "https://app.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(res.status().is_success());
    assert_eq!(res.headers()["access-control-allow-origin"], "https://app.example");
    assert_eq!(res.headers()["access-control-allow-credentials"], "true");

    shutdown.trigger();
}
