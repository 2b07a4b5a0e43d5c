use crate::error::ApiError;

/// Maximum prompt length for speech requests
const MAX_TEXT_LENGTH: usize = 5000;
/// Maximum voice id length
const MAX_VOICE_ID_LENGTH: usize = 64;

/// Validate a speech request
pub fn validate_speak_request(text: &str, voice_id: Option<&str>) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }

    if let Some(voice_id) = voice_id {
        validate_voice_id(voice_id)?;
    }

    Ok(())
}

/// Voice ids are short ASCII alphanumeric tokens (e.g. 21m00Tcm4TlvDq8ikWAM)
pub fn validate_voice_id(voice_id: &str) -> Result<(), ApiError> {
    if voice_id.is_empty() || voice_id.len() > MAX_VOICE_ID_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Voice id must be 1 to {} characters",
            MAX_VOICE_ID_LENGTH
        )));
    }
    if !voice_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::InvalidInput(format!(
            "Invalid voice id format: {}. Expected ASCII letters and digits",
            voice_id
        )));
    }
    Ok(())
}
