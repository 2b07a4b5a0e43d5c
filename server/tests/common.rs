//! Common utilities for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use server::{app, config::ServerConfig, AppState, TokenSource, TokenStream};
use tts_core::{Pipeline, SynthesisConfig};

pub const TEST_KEY: &str = "test-key";

/// Token source replaying a fixed reply.
pub struct FakeTokens(pub Vec<&'static str>);

impl TokenSource for FakeTokens {
    fn tokens(&self, _prompt: &str) -> TokenStream {
        let items: Vec<anyhow::Result<Option<String>>> =
            self.0.iter().map(|t| Ok(Some(t.to_string()))).collect();
        futures::stream::iter(items).boxed()
    }
}

pub fn test_state(synthesis_url: &str, config: ServerConfig) -> AppState {
    let synthesis = SynthesisConfig {
        api_key: "eleven-key".into(),
        base_url: synthesis_url.to_string(),
        idle_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let llm = Arc::new(FakeTokens(vec!["Hello", " world."]));
    AppState::new(Pipeline::new(synthesis), llm, config)
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        api_keys: vec![TEST_KEY.to_string()],
        ..Default::default()
    }
}

/// Create a test app instance
pub fn create_test_app(synthesis_url: &str) -> (Router, AppState) {
    let state = test_state(synthesis_url, test_config());
    let router = app(state.clone()).expect("router builds");
    (router, state)
}

pub fn speak_request(uri: &str, key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// An address nothing listens on.
pub async fn unused_synthesis_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/v1")
}

/// Mock synthesis service answering every frame with its own bytes as audio.
/// Returns the texts it received, handshake included.
pub async fn spawn_echo_synthesis() -> (String, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let mut texts = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let value: Value = serde_json::from_str(&text).unwrap();
            let text = value["text"].as_str().unwrap_or_default().to_string();
            let reply = if value["try_trigger_generation"] == json!(true) {
                Some(json!({ "audio": general_purpose::STANDARD.encode(text.as_bytes()), "isFinal": null }))
            } else if text.is_empty() {
                Some(json!({ "audio": null, "isFinal": true }))
            } else {
                None
            };
            texts.push(text);
            if let Some(reply) = reply {
                let _ = ws.send(Message::Text(reply.to_string().into())).await;
            }
        }
        texts
    });
    (format!("ws://{addr}/v1"), handle)
}
