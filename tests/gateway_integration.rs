//! Integration tests for the Gateway RPC client.
//!
//! Each test spins up a mock Gateway server implementing the two-step handshake, connects a
//! `GatewayClient`, and verifies the expected interaction.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gateway_client::config::{Auth, ClientMetadata, ResolvedConfig, ResolvedConnection};
use gateway_client::client::GatewayClient;
use gateway_client::reconnect::ReconnectPolicy;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

// =============================================================================
// Mock server helpers
// =============================================================================

/// Sends the challenge frame and reads+validates the connect request, responding `ok: true`.
/// Returns the split sink/source for the test to drive further.
macro_rules! handshake_ok {
    ($sink:expr, $source:expr) => {{
        $sink
            .send(Message::Text(json!({"type":"challenge","nonce":"abc"}).to_string().into()))
            .await
            .unwrap();
        let connect_req = $source.next().await.unwrap().unwrap();
        let connect_req: Value = match connect_req {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            _ => panic!("expected text frame"),
        };
        let id = connect_req["id"].clone();
        $sink
            .send(Message::Text(json!({"type":"res","id": id,"ok": true,"payload": {}}).to_string().into()))
            .await
            .unwrap();
    }};
}

/// Starts a mock server that completes the handshake, then echoes `{"status":"ok", ...}` for
/// every request it receives.
async fn start_echo_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                handshake_ok!(sink, source);
                while let Some(Ok(Message::Text(text))) = source.next().await {
                    let req: Value = serde_json::from_str(&text).unwrap();
                    let response = json!({"type":"res","id": req["id"],"ok": true,"payload": {"status":"ok"}});
                    sink.send(Message::Text(response.to_string().into())).await.unwrap();
                }
            });
        }
    });
    (addr, handle)
}

/// Starts a mock server that completes the handshake, then never responds to any request
/// (for per-call timeout tests).
async fn start_silent_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                handshake_ok!(sink, source);
                while source.next().await.is_some() {}
            });
        }
    });
    (addr, handle)
}

/// Starts a mock server that rejects the connect request with an `UNAVAILABLE` auth failure.
async fn start_auth_reject_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                sink.send(Message::Text(json!({"type":"challenge","nonce":"abc"}).to_string().into()))
                    .await
                    .unwrap();
                let connect_req = source.next().await.unwrap().unwrap();
                let connect_req: Value = match connect_req {
                    Message::Text(text) => serde_json::from_str(&text).unwrap(),
                    _ => panic!("expected text frame"),
                };
                let id = connect_req["id"].clone();
                let response = json!({
                    "type":"res","id": id,"ok": false,
                    "error": {"code":"UNAVAILABLE","message":"auth rejected"}
                });
                sink.send(Message::Text(response.to_string().into())).await.unwrap();
            });
        }
    });
    (addr, handle)
}

/// Starts a mock server that completes the handshake, answers the first request, then drops the
/// connection; subsequent accepted connections behave the same (for reconnect tests).
async fn start_drop_after_first_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                handshake_ok!(sink, source);
                if let Some(Ok(Message::Text(text))) = source.next().await {
                    let req: Value = serde_json::from_str(&text).unwrap();
                    let response = json!({"type":"res","id": req["id"],"ok": true,"payload": {}});
                    sink.send(Message::Text(response.to_string().into())).await.unwrap();
                }
                // Drop the socket instead of serving further requests.
            });
        }
    });
    (addr, handle)
}

/// Starts a mock server that completes the handshake, then for the `agent` method sends an ack
/// response immediately, followed by a second completion response on the same id after a short
/// delay driven by `release_rx`.
async fn start_agent_server() -> (SocketAddr, mpsc::Sender<()>, JoinHandle<()>) {
    let (release_tx, mut release_rx) = mpsc::channel::<()>(1);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();
            handshake_ok!(sink, source);

            let agent_req = source.next().await.unwrap().unwrap();
            let agent_req: Value = match agent_req {
                Message::Text(text) => serde_json::from_str(&text).unwrap(),
                _ => panic!("expected text frame"),
            };
            let id = agent_req["id"].clone();

            let ack = json!({"type":"res","id": id,"ok": true,"payload": {"runId": "R"}});
            sink.send(Message::Text(ack.to_string().into())).await.unwrap();

            release_rx.recv().await;

            let completion = json!({
                "type": "res",
                "id": id,
                "ok": true,
                "payload": {
                    "runId": "R",
                    "status": "ok",
                    "result": {"payloads": [{"text": "hello"}, {"text": "world"}]},
                },
            });
            sink.send(Message::Text(completion.to_string().into())).await.unwrap();
        }
    });
    (addr, release_tx, handle)
}

fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{addr}/")
}

fn test_config(addr: SocketAddr, timeout: Duration) -> ResolvedConfig {
    ResolvedConfig {
        config_path: None,
        connection: ResolvedConnection {
            host: addr.ip().to_string(),
            port: addr.port(),
            timeout,
            connect_timeout: Duration::from_secs(5),
            agent_timeout: Duration::from_secs(5),
        },
        auth: Some(Auth::Token("test-token".to_owned())),
        client: ClientMetadata {
            id: "test-client".to_owned(),
            version: "0.0.0".to_owned(),
            platform: "test".to_owned(),
            mode: "interactive".to_owned(),
        },
        reconnect: ReconnectPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(200),
        },
        output_format: "json".to_owned(),
        min_protocol: 1,
        max_protocol: 1,
        role: "operator",
    }
}

// =============================================================================
// Tests
// =============================================================================

/// Happy-path RPC: connect, send `health`, get a response back.
#[tokio::test]
async fn connect_and_health_roundtrip() {
    let (addr, _handle) = start_echo_server().await;
    let config = test_config(addr, Duration::from_secs(5));
    let (client, _events) = GatewayClient::connect(&config, Vec::new()).await.unwrap();

    assert!(client.is_connected());
    let result = client.health().await.unwrap();
    assert_eq!(result, json!({"status": "ok"}));
}

/// Per-call timeout: the server never answers, so the request rejects with a timeout error.
#[tokio::test]
async fn request_times_out_when_server_is_silent() {
    let (addr, _handle) = start_silent_server().await;
    let config = test_config(addr, Duration::from_millis(200));
    let (client, _events) = GatewayClient::connect(&config, Vec::new()).await.unwrap();

    let result = client.status().await;
    let error = result.unwrap_err();
    assert_eq!(error.code(), "AGENT_TIMEOUT");
}

/// Auth failure during the handshake surfaces as an auth error before the client is ever usable.
#[tokio::test]
async fn handshake_auth_rejection_fails_connect() {
    let (addr, _handle) = start_auth_reject_server().await;
    let config = test_config(addr, Duration::from_secs(5));

    let result = GatewayClient::connect(&config, Vec::new()).await;
    let error = result.unwrap_err();
    assert_eq!(error.code(), "UNAVAILABLE");
}

/// Reconnect: after the socket drops, a background reconnect succeeds and further requests
/// succeed again against the new connection.
#[tokio::test]
async fn reconnects_after_connection_drop() {
    let (addr, _handle) = start_drop_after_first_server().await;
    let config = test_config(addr, Duration::from_secs(5));
    let (client, _events) = GatewayClient::connect(&config, Vec::new()).await.unwrap();

    let _ = client.health().await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(client.is_connected(), "client should reconnect after the server drops the socket");

    let result = client.health().await;
    assert!(result.is_ok(), "request after reconnect should succeed: {result:?}");
}

/// Split-response `agent` call: ack arrives first, the completion arrives later on the same id.
#[tokio::test]
async fn agent_call_resolves_on_second_response() {
    let (addr, release_tx, _handle) = start_agent_server().await;
    let config = test_config(addr, Duration::from_secs(5));
    let (client, _events) = GatewayClient::connect(&config, Vec::new()).await.unwrap();

    let agent_future = client.agent(json!({"prompt": "hi"}));
    tokio::time::sleep(Duration::from_millis(50)).await;
    release_tx.send(()).await.unwrap();

    let completion = agent_future.await;
    assert_eq!(completion["runId"], "R");
    assert_eq!(completion["status"], "completed");
    assert_eq!(completion["output"], "hello\nworld");
}

/// `agent` never rejects: a transport failure is demoted to a `{"status":"failed"}` value.
#[tokio::test]
async fn agent_call_demotes_transport_failure_to_failed_status() {
    let (addr, _handle) = start_silent_server().await;
    let config = test_config(addr, Duration::from_millis(200));
    let (client, _events) = GatewayClient::connect(&config, Vec::new()).await.unwrap();

    let completion = client.agent(json!({"prompt": "hi"})).await;
    assert_eq!(completion["status"], "failed");
    assert_eq!(completion["code"], "AGENT_TIMEOUT");
}

/// `GatewayManager` coalesces two concurrent `get_client` calls for the same key into a single
/// connection attempt.
#[tokio::test]
async fn manager_coalesces_concurrent_creation_for_same_key() {
    use gateway_client::manager::GatewayManager;

    let (addr, _handle) = start_echo_server().await;
    let config = test_config(addr, Duration::from_secs(5));
    let manager = std::sync::Arc::new(GatewayManager::new());

    let manager_a = manager.clone();
    let config_a = config.clone();
    let task_a = tokio::spawn(async move {
        manager_a
            .get_client("bot-1", || async move {
                let (client, _events) = GatewayClient::connect(&config_a, Vec::new()).await?;
                Ok(client)
            })
            .await
    });

    let manager_b = manager.clone();
    let config_b = config.clone();
    let task_b = tokio::spawn(async move {
        manager_b
            .get_client("bot-1", || async move {
                let (client, _events) = GatewayClient::connect(&config_b, Vec::new()).await?;
                Ok(client)
            })
            .await
    });

    let client_a = task_a.await.unwrap().unwrap();
    let client_b = task_b.await.unwrap().unwrap();

    assert!(std::sync::Arc::ptr_eq(&client_a, &client_b));
    assert_eq!(manager.len().await, 1);
}
