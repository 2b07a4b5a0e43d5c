// Configuration for the HTTP server

use std::time::Duration;

/// Default player: no window, exit once stdin is drained.
pub const DEFAULT_PLAYER_COMMAND: &str = "ffplay -nodisp -autoexit -loglevel quiet -";

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Keys accepted in the `x-api-key` header. Empty rejects every request.
    pub api_keys: Vec<String>,
    pub player_command: String,
    /// Audio frames buffered between the pipeline and a streaming response.
    pub audio_channel_capacity: usize,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("api_keys", &format!("<{} keys>", self.api_keys.len()))
            .field("player_command", &self.player_command)
            .field("audio_channel_capacity", &self.audio_channel_capacity)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 120,
            cors_allowed_origins: None,
            api_keys: Vec::new(),
            player_command: DEFAULT_PLAYER_COMMAND.to_string(),
            audio_channel_capacity: 32,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let rate_limit_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| split_list(&origins));

        let api_keys = std::env::var("SERVER_API_KEYS")
            .map(|keys| split_list(&keys))
            .unwrap_or_default();

        let player_command = std::env::var("PLAYER_COMMAND")
            .ok()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(defaults.player_command);

        let audio_channel_capacity = std::env::var("AUDIO_CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|c| *c > 0)
            .unwrap_or(defaults.audio_channel_capacity);

        Self {
            port,
            rate_limit_per_minute,
            request_timeout_secs,
            cors_allowed_origins,
            api_keys,
            player_command,
            audio_channel_capacity,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_authorized(&self, key: Option<&str>) -> bool {
        match key {
            Some(key) if !key.is_empty() => self.api_keys.iter().any(|k| k == key),
            _ => false,
        }
    }

    /// Player program and its arguments.
    pub fn player_argv(&self) -> (&str, Vec<&str>) {
        let mut parts = self.player_command.split_whitespace();
        let program = parts.next().unwrap_or("ffplay");
        (program, parts.collect())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_check() {
        let config = ServerConfig {
            api_keys: split_list("alpha, beta,,"),
            ..Default::default()
        };
        assert_eq!(config.api_keys, vec!["alpha", "beta"]);
        assert!(config.is_authorized(Some("beta")));
        assert!(!config.is_authorized(Some("gamma")));
        assert!(!config.is_authorized(Some("")));
        assert!(!config.is_authorized(None));
        assert!(!ServerConfig::default().is_authorized(Some("alpha")));
    }

    #[test]
    fn test_player_argv() {
        let config = ServerConfig::default();
        let (program, args) = config.player_argv();
        assert_eq!(program, "ffplay");
        assert_eq!(args, vec!["-nodisp", "-autoexit", "-loglevel", "quiet", "-"]);
    }
}
