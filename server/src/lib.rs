//! HTTP front end: a prompt goes to the language model, the reply is spoken
//! through the streaming synthesis pipeline.
pub mod config;
pub mod error;
pub mod metrics;
pub mod validation;

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, map_response_body::MapResponseBodyLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use tts_core::{drive, CancellationToken, ChannelSink, Pipeline, PlaybackTiming, PlayerSink, TimingReport};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{MetricsResponse, PipelineMetrics};
use crate::validation::validate_speak_request;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

pub type TokenStream = BoxStream<'static, anyhow::Result<Option<String>>>;

/// Produces the reply tokens for a prompt.
pub trait TokenSource: Send + Sync {
    fn tokens(&self, prompt: &str) -> TokenStream;
}

impl TokenSource for llm_core::OpenAiClient {
    fn tokens(&self, prompt: &str) -> TokenStream {
        self.chat_stream(prompt).boxed()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub llm: Arc<dyn TokenSource>,
    pub metrics: Arc<PipelineMetrics>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, llm: Arc<dyn TokenSource>, config: ServerConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            llm,
            metrics: Arc::new(PipelineMetrics::new()),
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
    pub voice_id: Option<String>,
}

/// Build the router with its middleware stack.
pub fn app(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(60_000 / u64::from(config.rate_limit_per_minute.max(1)))
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(MapResponseBodyLayer::new(Body::new))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors_layer(&config))
        .into_inner();

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .route("/speak", post(speak))
        .route("/speak/local", post(speak_local));

    Ok(Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS not set or empty, allowing all origins");
        base.allow_origin(tower_http::cors::Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(tower_http::cors::AllowOrigin::list(origins))
    }
}

async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = value.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

fn authorize(config: &ServerConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    if config.is_authorized(key) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(state.metrics.snapshot())
}

/// Speak the model's reply, streaming audio back as it is synthesized.
///
/// The session is opened before the response starts so that connection and
/// credential failures surface as HTTP errors. Dropping the response body
/// cancels the run.
pub async fn speak(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SpeakRequest>,
) -> Result<Response, ApiError> {
    state.metrics.record_request();
    authorize(&state.config, &headers)?;
    validate_speak_request(&req.text, req.voice_id.as_deref())?;

    let timing = PlaybackTiming::start();
    let session = state.pipeline.open(req.voice_id.as_deref()).await.map_err(|e| {
        state.metrics.record_failure();
        ApiError::from(e)
    })?;
    info!(voice_id = session.voice_id(), prompt_len = req.text.len(), "Streaming speech");

    let tokens = state.llm.tokens(&req.text);
    let (mut sink, rx) = ChannelSink::new(state.config.audio_channel_capacity);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let metrics = state.metrics.clone();
    tokio::spawn(async move {
        let result = drive(session, tokens, &mut sink, timing, &cancel).await;
        metrics.record_run(&result);
    });

    let body = ReceiverStream::new(rx).map(move |frame| {
        let _cancel_on_drop = &guard;
        Ok::<_, Infallible>(frame)
    });
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], Body::from_stream(body)).into_response())
}

/// Speak the model's reply through the host's audio player and report timing.
pub async fn speak_local(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SpeakRequest>,
) -> Result<Json<TimingReport>, ApiError> {
    state.metrics.record_request();
    authorize(&state.config, &headers)?;
    validate_speak_request(&req.text, req.voice_id.as_deref())?;

    let (program, args) = state.config.player_argv();
    let mut sink = PlayerSink::spawn(program, &args).map_err(|e| ApiError::InternalError(e.to_string()))?;

    let tokens = state.llm.tokens(&req.text);
    let result = state
        .pipeline
        .run(tokens, req.voice_id.as_deref(), &mut sink, &CancellationToken::new())
        .await;
    state.metrics.record_run(&result);

    let timing = result?;
    Ok(Json(timing.report()))
}
