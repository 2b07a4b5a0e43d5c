// Synthesis session configuration

use std::time::Duration;

use crate::protocol::VoiceSettings;

pub const DEFAULT_BASE_URL: &str = "wss://api.elevenlabs.io/v1";
pub const DEFAULT_MODEL_ID: &str = "eleven_turbo_v2";
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

#[derive(Clone)]
pub struct SynthesisConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_id: String,
    pub default_voice_id: String,
    pub voice_settings: VoiceSettings,
    /// Longest gap tolerated between inbound messages.
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
}

// Keep the API key out of logs.
impl std::fmt::Debug for SynthesisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model_id", &self.model_id)
            .field("default_voice_id", &self.default_voice_id)
            .field("voice_settings", &self.voice_settings)
            .field("idle_timeout", &self.idle_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            default_voice_id: DEFAULT_VOICE_ID.to_string(),
            voice_settings: VoiceSettings::default(),
            idle_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SynthesisConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_key = std::env::var("ELEVEN_API_KEY").unwrap_or_default();

        let base_url = std::env::var("ELEVEN_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.base_url);

        let model_id = std::env::var("ELEVEN_MODEL_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.model_id);

        let default_voice_id = std::env::var("VOICE_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.default_voice_id);

        let stability = std::env::var("VOICE_STABILITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.voice_settings.stability);

        let similarity_boost = std::env::var("VOICE_SIMILARITY_BOOST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.voice_settings.similarity_boost);

        let idle_timeout = std::env::var("TTS_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_timeout);

        let connect_timeout = std::env::var("TTS_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout);

        Self {
            api_key,
            base_url,
            model_id,
            default_voice_id,
            voice_settings: VoiceSettings {
                stability,
                similarity_boost,
            },
            idle_timeout,
            connect_timeout,
        }
    }

    /// Streaming-input endpoint for `voice_id`.
    pub fn stream_url(&self, voice_id: &str) -> String {
        format!(
            "{}/text-to-speech/{}/stream-input?model_id={}",
            self.base_url.trim_end_matches('/'),
            voice_id,
            self.model_id
        )
    }
}
