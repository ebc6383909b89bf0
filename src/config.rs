//! Client configuration
//!
//! Configuration is layered: the embedded `config.toml` provides defaults,
//! an optional user file under the platform config directory replaces it,
//! and `INTERVOX_BASE_URL` in the environment overrides the backend address.

use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Built-in defaults shipped with the binary
const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml");

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Config {
    pub backend: BackendConfig,
    pub interview: InterviewConfig,
    pub scraper: ScraperConfig,
    pub speech: SpeechConfig,
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BackendConfig {
    /// HTTP base URL of the backend (e.g. "http://127.0.0.1:8000")
    pub base_url: String,
}

/// Candidate identity sent with every start-interview request
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InterviewConfig {
    pub default_type: String,
    pub candidate_name: String,
    pub position: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScraperConfig {
    /// Platform identifier sent with every scrape request
    pub platform: String,
    pub default_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SpeechConfig {
    /// Initial playback volume, 0.0 to 1.0
    pub volume: f32,
    /// Optional TTS voice name, backend default when unset
    pub voice: Option<String>,
    /// Optional TTS speed multiplier, backend default when unset
    pub speed: Option<f64>,
}

/// Push connection retry policy
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ReconnectConfig {
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    /// Consecutive failed attempts before entering the offline state
    pub max_attempts: u32,
}

impl ReconnectConfig {
    /// Backoff delay before the given attempt (1-based), doubling from the
    /// initial delay and capped at the configured maximum.
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let secs = self.initial_delay_secs.saturating_mul(1u64 << exp);
        Duration::from_secs(secs.min(self.max_delay_secs))
    }
}

/// Path of the optional user configuration file
fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("intervox").join("config.toml"))
}

impl Config {
    /// Load configuration: user file when present and valid, embedded
    /// defaults otherwise, then environment overrides.
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(DEFAULT_CONFIG_TOML)?;

        if let Some(path) = user_config_path() {
            if path.exists() {
                match fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<Config>(&contents) {
                        Ok(user) => {
                            info!("Loaded user configuration from {:?}", path);
                            config = user;
                        }
                        Err(e) => {
                            warn!("Ignoring invalid user configuration {:?}: {}", path, e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read user configuration {:?}: {}", path, e);
                    }
                }
            }
        }

        if let Ok(base_url) = std::env::var("INTERVOX_BASE_URL") {
            if !base_url.trim().is_empty() {
                config.backend.base_url = base_url;
            }
        }

        Ok(config)
    }

    /// Derive the push channel URL from the HTTP base URL
    /// ("http" becomes "ws", "https" becomes "wss", path is "/ws").
    pub(crate) fn ws_url(&self) -> Result<url::Url, ConfigError> {
        let mut url = url::Url::parse(&self.backend.base_url)?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::UnsupportedScheme(url.scheme().to_string()))?;
        url.set_path("/ws");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Config {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("embedded defaults must parse")
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config = defaults();
        assert_eq!(config.scraper.platform, "leetcode");
        assert_eq!(config.interview.default_type, "technical");
        assert!(config.speech.volume > 0.0 && config.speech.volume <= 1.0);
    }

    #[test]
    fn test_ws_url_from_http() {
        let mut config = defaults();
        config.backend.base_url = "http://localhost:8000".to_string();
        assert_eq!(config.ws_url().unwrap().as_str(), "ws://localhost:8000/ws");
    }

    #[test]
    fn test_ws_url_from_https() {
        let mut config = defaults();
        config.backend.base_url = "https://interviews.example.com".to_string();
        assert_eq!(
            config.ws_url().unwrap().as_str(),
            "wss://interviews.example.com/ws"
        );
    }

    #[test]
    fn test_ws_url_rejects_unknown_scheme() {
        let mut config = defaults();
        config.backend.base_url = "ftp://example.com".to_string();
        assert!(matches!(
            config.ws_url(),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectConfig {
            initial_delay_secs: 3,
            max_delay_secs: 60,
            max_attempts: 10,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(6));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(12));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_secs(60));
    }
}
