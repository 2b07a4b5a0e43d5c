//! Streaming chat completions used as the token source for speech.
use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub mod sse;

pub use sse::{SseDecoder, SseEvent};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Client configuration, read from the environment.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub system_prompt: Option<String>,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("system_prompt", &self.system_prompt)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 1.0,
            system_prompt: None,
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Reads `OPENAI_API_KEY` (required), `OPENAI_BASE_URL`, `LLM_MODEL`,
    /// `LLM_TEMPERATURE`, `LLM_SYSTEM_PROMPT` and `LLM_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set in the environment")?;
        let mut config = Self::new(api_key);

        if let Ok(url) = env::var("OPENAI_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            config.model = model;
        }
        config.temperature = env::var("LLM_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.temperature);
        config.system_prompt = env::var("LLM_SYSTEM_PROMPT").ok().filter(|p| !p.trim().is_empty());
        config.request_timeout = env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.request_timeout);
        Ok(config)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Structure for the OpenAI Chat API request
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// One streamed chunk of the OpenAI Chat API response
#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

/// Content delta carried by one `data:` payload. Role-only and empty chunks
/// yield `None`.
pub fn parse_delta(data: &str) -> Result<Option<String>> {
    let chunk: ChatChunk = serde_json::from_str(data).context("malformed completion chunk")?;
    Ok(chunk.choices.into_iter().next().and_then(|c| c.delta.content))
}

pub struct OpenAiClient {
    config: LlmConfig,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, client })
    }

    /// Create a client from `LlmConfig::from_env`.
    pub fn from_env() -> Result<Self> {
        Self::new(LlmConfig::from_env()?)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Stream the reply to `prompt` as it is generated.
    ///
    /// Nothing is sent until the stream is first polled. Each item is the
    /// content delta of one chunk; chunks without content yield `None`.
    pub fn chat_stream(&self, prompt: &str) -> impl Stream<Item = Result<Option<String>>> + Send + 'static {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.config.system_prompt.as_deref() {
            messages.push(Message { role: "system", content: system });
        }
        messages.push(Message { role: "user", content: prompt });
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            stream: true,
        };

        let request = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body);
        let model = self.config.model.clone();

        try_stream! {
            info!(model = %model, "Requesting streamed completion");
            let response = request
                .send()
                .await
                .context("chat completion request failed")?
                .error_for_status()
                .context("chat completion request rejected")?;

            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut deltas = 0usize;
            let mut done = false;
            while !done {
                let chunk = match bytes.next().await {
                    Some(chunk) => chunk.context("reading completion stream failed")?,
                    None => {
                        if let Some(SseEvent::Data(data)) = decoder.finish() {
                            deltas += 1;
                            yield parse_delta(&data)?;
                        }
                        break;
                    }
                };
                for event in decoder.feed(&chunk) {
                    match event {
                        SseEvent::Data(data) => {
                            deltas += 1;
                            yield parse_delta(&data)?;
                        }
                        SseEvent::Done => {
                            done = true;
                            break;
                        }
                    }
                }
            }
            debug!(deltas, "Completion stream finished");
        }
    }
}
