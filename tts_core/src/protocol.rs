//! Wire messages of the text-in/audio-out synthesis stream.
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsError};

/// Voice parameters sent once with the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f64,
    pub similarity_boost: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.8,
        }
    }
}

/// Text sent to the synthesis service.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage<'a> {
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_settings: Option<VoiceSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xi_api_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub try_trigger_generation: Option<bool>,
}

impl<'a> OutboundMessage<'a> {
    /// First message of a session: a single space, voice settings and credentials.
    pub fn handshake(voice_settings: VoiceSettings, api_key: &'a str) -> Self {
        Self {
            text: " ",
            voice_settings: Some(voice_settings),
            xi_api_key: Some(api_key),
            try_trigger_generation: None,
        }
    }

    pub fn frame(text: &'a str) -> Self {
        Self {
            text,
            voice_settings: None,
            xi_api_key: None,
            try_trigger_generation: Some(true),
        }
    }

    /// Empty text tells the service no more input follows.
    pub fn end_of_input() -> Self {
        Self {
            text: "",
            voice_settings: None,
            xi_api_key: None,
            try_trigger_generation: None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| TtsError::Protocol(format!("encode: {e}")))
    }
}

/// Message received from the synthesis service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub is_final: Option<bool>,
    // Present when the service rejects the request.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<u16>,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| TtsError::Protocol(format!("decode: {e}")))
    }

    pub fn is_final(&self) -> bool {
        self.is_final.unwrap_or(false)
    }

    /// Decoded audio bytes, if the message carries any.
    pub fn audio_bytes(&self) -> Result<Option<Vec<u8>>> {
        match self.audio.as_deref() {
            Some(b64) if !b64.is_empty() => general_purpose::STANDARD
                .decode(b64)
                .map(Some)
                .map_err(|e| TtsError::Protocol(format!("invalid base64 audio: {e}"))),
            _ => Ok(None),
        }
    }

    /// Maps an error payload to the matching error kind.
    pub fn remote_error(&self) -> Option<TtsError> {
        let kind = self.error.as_deref()?;
        let detail = self.message.clone().unwrap_or_else(|| kind.to_string());
        if is_auth_failure(self.code, kind) || is_auth_failure(None, &detail) {
            Some(TtsError::Auth(detail))
        } else {
            Some(TtsError::Protocol(format!("remote error {kind}: {detail}")))
        }
    }
}

/// Close code the service uses for policy violations such as a bad API key.
pub const POLICY_VIOLATION: u16 = 1008;

pub(crate) fn is_auth_failure(code: Option<u16>, reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    let mentions_auth = reason.contains("auth") || reason.contains("api key") || reason.contains("api_key");
    mentions_auth && code.map_or(true, |c| c == POLICY_VIOLATION)
}
