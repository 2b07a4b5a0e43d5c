//! Integration tests for the speech server

mod common;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;

use common::*;

#[tokio::test]
async fn test_health_check() {
    let (app, _) = create_test_app(&unused_synthesis_url().await);
    for uri in ["/health", "/api/health"] {
        let response = send(&app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_bytes(response).await, b"ok");
    }
}

#[tokio::test]
async fn test_metrics_start_empty() {
    let (app, _) = create_test_app(&unused_synthesis_url().await);
    let response = send(&app, Request::builder().uri("/metrics").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let metrics = body_json(response).await;
    assert_eq!(metrics["runs"], 0);
    assert_eq!(metrics["failures"], 0);
    assert!(metrics["ttfa_p50_ms"].is_null());
    assert!(metrics["timestamp"].is_string());
}

#[tokio::test]
async fn test_speak_requires_api_key() {
    let (app, _) = create_test_app(&unused_synthesis_url().await);

    for key in [None, Some("wrong-key")] {
        let response = send(&app, speak_request("/speak", key, json!({ "text": "Hi" }))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["code"], 401);
    }

    let response = send(&app, speak_request("/speak/local", None, json!({ "text": "Hi" }))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_speak_validates_input() {
    let (app, _) = create_test_app(&unused_synthesis_url().await);

    let response = send(&app, speak_request("/speak", Some(TEST_KEY), json!({ "text": "" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].as_str().unwrap().contains("empty"));

    let long = "a".repeat(5001);
    let response = send(&app, speak_request("/speak", Some(TEST_KEY), json!({ "text": long }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        speak_request("/speak", Some(TEST_KEY), json!({ "text": "Hi", "voice_id": "../voices" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_speak_unreachable_synthesis_is_bad_gateway() {
    let (app, state) = create_test_app(&unused_synthesis_url().await);

    let response = send(&app, speak_request("/speak", Some(TEST_KEY), json!({ "text": "Hi" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], 502);

    let metrics = state.metrics.snapshot();
    assert_eq!(metrics.runs, 1);
    assert_eq!(metrics.failures, 1);
}

#[tokio::test]
async fn test_speak_streams_audio() {
    let (synthesis_url, synthesis) = spawn_echo_synthesis().await;
    let (app, state) = create_test_app(&synthesis_url);

    let response = send(
        &app,
        speak_request("/speak", Some(TEST_KEY), json!({ "text": "Say hello", "voice_id": "abc123" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");

    // "Hello", " world." chunk into "Hello  " and "world. ".
    assert_eq!(body_bytes(response).await, b"Hello  world. ");

    let texts = tokio::time::timeout(Duration::from_secs(5), synthesis)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(texts, vec![" ", "Hello  ", "world. ", ""]);

    // The run is recorded by the task that drives it.
    let mut runs = 0;
    for _ in 0..50 {
        runs = state.metrics.snapshot().runs;
        if runs == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(runs, 1);
    assert_eq!(state.metrics.snapshot().failures, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_speak_local_reports_timing() {
    let (synthesis_url, _synthesis) = spawn_echo_synthesis().await;
    let config = server::config::ServerConfig {
        player_command: "cat".into(),
        ..test_config()
    };
    let state = test_state(&synthesis_url, config);
    let app = server::app(state.clone()).unwrap();

    let response = send(&app, speak_request("/speak/local", Some(TEST_KEY), json!({ "text": "Hi" }))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let report = body_json(response).await;
    assert_eq!(report["frames"], 2);
    assert_eq!(report["bytes"], 14);
    assert!(report["time_to_first_audio_ms"].as_f64().unwrap() <= report["total_ms"].as_f64().unwrap());
    assert_eq!(state.metrics.snapshot().runs, 1);
}
