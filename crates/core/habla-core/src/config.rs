//! Configuration loading from environment variables

use std::path::PathBuf;

use crate::error::{HablaError, Result};

/// Load environment variables from a `.env` file if present.
///
/// Call this once at startup before [`HablaConfig::from_env`]. A missing
/// `.env` file is not an error; real environment variables always win.
pub fn load_env() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded environment from .env");
    }
}

/// Get an environment variable with a fallback default
pub fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable parsed as an integer, with a fallback default
pub fn get_env_int(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Get an environment variable parsed as a boolean, with a fallback default
///
/// Accepts `1`/`true`/`yes`/`on` (case-insensitive) as true.
pub fn get_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(
            v.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// Runtime configuration for the bot, resolved from the environment
#[derive(Debug, Clone)]
pub struct HablaConfig {
    /// Discord bot token (`DISCORD_TOKEN`, required)
    pub token: String,
    /// Command prefix, e.g. `T` for `Tjoin` (`COMMAND_PREFIX`)
    pub command_prefix: String,
    /// Base URL of the neural-TTS HTTP gateway (`TTS_ENDPOINT`)
    pub tts_endpoint: String,
    /// Default voice short name (`TTS_VOICE`)
    pub default_voice: String,
    /// Default speech rate offset, e.g. `+0%` (`TTS_RATE`)
    pub default_rate: String,
    /// Default volume offset, e.g. `+0%` (`TTS_VOLUME`)
    pub default_volume: String,
    /// Maximum spoken message length in characters (`MAX_MESSAGE_LENGTH`)
    pub max_message_length: usize,
    /// Seconds a guild worker waits for jobs before exiting (`AUDIO_TIMEOUT`)
    pub audio_timeout_secs: u64,
    /// Path of the saves file (`SAVES_FILE`)
    pub saves_file: PathBuf,
    /// Comma-separated initial whitelist, used when the saves file does not
    /// exist yet (`TARGET_USERS`)
    pub initial_target_users: Vec<String>,
}

impl HablaConfig {
    /// Build the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("DISCORD_TOKEN")
            .map_err(|_| HablaError::config("DISCORD_TOKEN is not set"))?;

        let initial_target_users = get_env_or("TARGET_USERS", "")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            token,
            command_prefix: get_env_or("COMMAND_PREFIX", "T"),
            tts_endpoint: get_env_or("TTS_ENDPOINT", "http://127.0.0.1:5002"),
            default_voice: get_env_or("TTS_VOICE", "es-ES-XimenaNeural"),
            default_rate: get_env_or("TTS_RATE", "+0%"),
            default_volume: get_env_or("TTS_VOLUME", "+0%"),
            max_message_length: get_env_int("MAX_MESSAGE_LENGTH", 500) as usize,
            audio_timeout_secs: get_env_int("AUDIO_TIMEOUT", 300) as u64,
            saves_file: PathBuf::from(get_env_or("SAVES_FILE", "saves.json")),
            initial_target_users,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that cannot work at runtime
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(HablaError::config("DISCORD_TOKEN is empty"));
        }
        if self.command_prefix.is_empty() {
            return Err(HablaError::config("COMMAND_PREFIX is empty"));
        }
        if self.tts_endpoint.trim().is_empty() {
            return Err(HablaError::config("TTS_ENDPOINT is empty"));
        }
        if self.max_message_length == 0 {
            return Err(HablaError::config("MAX_MESSAGE_LENGTH must be positive"));
        }
        if self.audio_timeout_secs == 0 {
            return Err(HablaError::config("AUDIO_TIMEOUT must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HablaConfig {
        HablaConfig {
            token: "test-token".to_string(),
            command_prefix: "T".to_string(),
            tts_endpoint: "http://127.0.0.1:5002".to_string(),
            default_voice: "es-ES-XimenaNeural".to_string(),
            default_rate: "+0%".to_string(),
            default_volume: "+0%".to_string(),
            max_message_length: 500,
            audio_timeout_secs: 300,
            saves_file: PathBuf::from("saves.json"),
            initial_target_users: vec![],
        }
    }

    #[test]
    fn test_get_env_or_default() {
        std::env::remove_var("HABLA_TEST_MISSING");
        assert_eq!(get_env_or("HABLA_TEST_MISSING", "fallback"), "fallback");

        std::env::set_var("HABLA_TEST_PRESENT", "value");
        assert_eq!(get_env_or("HABLA_TEST_PRESENT", "fallback"), "value");
        std::env::remove_var("HABLA_TEST_PRESENT");
    }

    #[test]
    fn test_get_env_int_parses_and_falls_back() {
        std::env::set_var("HABLA_TEST_INT", "42");
        assert_eq!(get_env_int("HABLA_TEST_INT", 7), 42);

        std::env::set_var("HABLA_TEST_INT", "not a number");
        assert_eq!(get_env_int("HABLA_TEST_INT", 7), 7);
        std::env::remove_var("HABLA_TEST_INT");
    }

    #[test]
    fn test_get_env_bool_variants() {
        for truthy in ["1", "true", "YES", "On"] {
            std::env::set_var("HABLA_TEST_BOOL", truthy);
            assert!(get_env_bool("HABLA_TEST_BOOL", false), "{truthy}");
        }
        std::env::set_var("HABLA_TEST_BOOL", "0");
        assert!(!get_env_bool("HABLA_TEST_BOOL", true));
        std::env::remove_var("HABLA_TEST_BOOL");
        assert!(get_env_bool("HABLA_TEST_BOOL", true));
    }

    #[test]
    fn test_validate_rejects_empty_token() {
        let mut config = test_config();
        config.token = "   ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = test_config();
        config.audio_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }
}
