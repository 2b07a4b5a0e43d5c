//! Mock synthesis service for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use tts_core::SynthesisConfig;

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Config pointing at a local mock server.
pub fn test_config(base_url: &str) -> SynthesisConfig {
    SynthesisConfig {
        api_key: "test-key".into(),
        base_url: base_url.to_string(),
        idle_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Accept exactly one websocket connection and hand it to `handler`.
pub async fn spawn_server<F, Fut, T>(handler: F) -> (String, JoinHandle<T>)
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        handler(ws).await
    });
    (format!("ws://{addr}/v1"), handle)
}

/// Server that answers the upgrade request with `status`. Returns the
/// `xi-api-key` header it saw.
pub async fn spawn_rejecting_server(status: StatusCode) -> (String, JoinHandle<Option<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut seen_key = None;
        let callback = |req: &Request, _resp: Response| -> Result<Response, ErrorResponse> {
            seen_key = req
                .headers()
                .get("xi-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let mut err = ErrorResponse::new(Some("rejected".to_string()));
            *err.status_mut() = status;
            Err(err)
        };
        let result = tokio_tungstenite::accept_hdr_async(tcp, callback).await;
        assert!(result.is_err());
        seen_key
    });
    (format!("ws://{addr}/v1"), handle)
}

/// An address nothing listens on.
pub async fn unused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/v1")
}

/// Listener that accepts TCP connections but never answers the upgrade.
pub async fn spawn_silent_listener() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            held.push(tcp);
        }
    });
    (format!("ws://{addr}/v1"), handle)
}

/// Next JSON text message, or `None` once the client closed or went away.
pub async fn next_json(ws: &mut ServerSocket) -> Option<Value> {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

/// Send errors are ignored; the client may already have gone away.
pub async fn send_audio(ws: &mut ServerSocket, audio: &[u8]) {
    let msg = json!({ "audio": general_purpose::STANDARD.encode(audio), "isFinal": null });
    let _ = ws.send(Message::Text(msg.to_string().into())).await;
}

pub async fn send_final(ws: &mut ServerSocket) {
    let msg = json!({ "audio": null, "isFinal": true });
    let _ = ws.send(Message::Text(msg.to_string().into())).await;
}

/// Wait until the client closes its end; true when it did within `limit`.
pub async fn wait_for_close(ws: &mut ServerSocket, limit: Duration) -> bool {
    tokio::time::timeout(limit, async {
        while next_json(ws).await.is_some() {}
    })
    .await
    .is_ok()
}

/// Echo service: every generation-triggering frame comes back as its own
/// bytes; the end-of-input marker is answered with the final message.
/// Returns every JSON message received, handshake included.
pub async fn echo_service(mut ws: ServerSocket) -> Vec<Value> {
    let mut received = Vec::new();
    while let Some(msg) = next_json(&mut ws).await {
        received.push(msg.clone());
        let text = msg["text"].as_str().unwrap_or_default().to_string();
        if msg["try_trigger_generation"] == json!(true) {
            send_audio(&mut ws, text.as_bytes()).await;
        } else if text.is_empty() {
            send_final(&mut ws).await;
        }
    }
    received
}
