use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, warn};

use llm_core::OpenAiClient;
use server::{app, config::ServerConfig, AppState};
use tts_core::{Pipeline, SynthesisConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting speech server...");

    let synthesis = SynthesisConfig::from_env();
    if synthesis.api_key.is_empty() {
        warn!("ELEVEN_API_KEY not set, the synthesis service will reject sessions");
    }
    info!(
        "Synthesis endpoint {} (model {}, default voice {})",
        synthesis.base_url, synthesis.model_id, synthesis.default_voice_id
    );

    let llm = OpenAiClient::from_env()?;
    info!("Using language model {}", llm.model());

    let config = ServerConfig::from_env();
    if config.api_keys.is_empty() {
        warn!("SERVER_API_KEYS not set, every speech request will be rejected");
    }
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, request_timeout={}s",
        config.port, config.rate_limit_per_minute, config.request_timeout_secs
    );

    let port = config.port;
    let state = AppState::new(Pipeline::new(synthesis), Arc::new(llm), config);
    let app = app(state)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT."))?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
