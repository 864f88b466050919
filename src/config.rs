//! Configuration management for agrichat
//!
//! This module handles loading, parsing, and validating configuration
//! for the chat subsystem: generative endpoints, object storage, and
//! conversation behavior.

use crate::error::{AgrichatError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for agrichat
///
/// Holds everything the subsystem needs: which generative endpoint to talk
/// to (direct or proxied), where attachments are uploaded, and the
/// conversation behavior knobs (history window, truncation lengths,
/// directory cap).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Generative endpoint configuration
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Attachment upload configuration
    #[serde(default)]
    pub upload: UploadConfig,

    /// Conversation behavior configuration
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Generative endpoint configuration
///
/// The proxied callable is the primary call shape; the direct endpoint is
/// the text-only fallback (and can be used standalone).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeneratorConfig {
    /// Direct-mode endpoint configuration
    #[serde(default)]
    pub direct: DirectConfig,

    /// Proxied callable configuration
    #[serde(default)]
    pub proxied: ProxiedConfig,
}

/// Direct-mode generative endpoint configuration
///
/// Generation parameters default to the values the assistant was tuned
/// with; safety thresholds are fixed in the provider and not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectConfig {
    /// Model endpoint URL (the API key is appended as a query parameter)
    #[serde(default)]
    pub endpoint: String,

    /// API key for the model endpoint
    #[serde(default)]
    pub api_key: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Top-k sampling parameter
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Top-p sampling parameter
    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// Maximum tokens in the generated reply
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Extra attempts for retryable transport failures (5xx, timeout)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_k() -> u32 {
    40
}

fn default_top_p() -> f64 {
    0.95
}

fn default_max_output_tokens() -> u32 {
    1024
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
        }
    }
}

/// Proxied callable configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxiedConfig {
    /// Callable function endpoint URL
    #[serde(default)]
    pub endpoint: String,

    /// Bearer token identifying the caller (the callable rejects
    /// unauthenticated invocations)
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ProxiedConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            auth_token: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Attachment upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Bucket endpoint that PUT requests are issued against
    #[serde(default)]
    pub endpoint: String,

    /// Public base URL that durable attachment URLs are built from
    #[serde(default)]
    pub public_base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            public_base_url: String::new(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Conversation behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Fixed system prompt prefixed to every composed conversation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// When set, the system prompt is wrapped with an instruction to
    /// answer in this language
    #[serde(default)]
    pub language: Option<String>,

    /// Seed message text written when a session is created
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,

    /// Number of most-recent messages included in a composed history
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Maximum title length derived from the first user message
    #[serde(default = "default_title_max_len")]
    pub title_max_len: usize,

    /// Maximum length of the last-message snapshot before the ellipsis
    #[serde(default = "default_last_message_max_len")]
    pub last_message_max_len: usize,

    /// Cap on the recency-ordered session directory
    #[serde(default = "default_session_list_limit")]
    pub session_list_limit: usize,
}

fn default_system_prompt() -> String {
    "You are AgriBot, a friendly farming assistant. You help farmers with \
     crop management, pest control, soil health, and sustainable farming \
     practices. Keep answers practical and easy to follow."
        .to_string()
}

fn default_welcome_message() -> String {
    "Hello! I'm AgriBot, your farming assistant. Ask me anything about \
     crops, pests, soil, or livestock."
        .to_string()
}

fn default_history_window() -> usize {
    10
}

fn default_title_max_len() -> usize {
    50
}

fn default_last_message_max_len() -> usize {
    50
}

fn default_session_list_limit() -> usize {
    20
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            language: None,
            welcome_message: default_welcome_message(),
            history_window: default_history_window(),
            title_max_len: default_title_max_len(),
            last_message_max_len: default_last_message_max_len(),
            session_list_limit: default_session_list_limit(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AgrichatError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Checks that at least one generative endpoint is configured and that
    /// the behavior knobs are usable.
    ///
    /// # Errors
    ///
    /// Returns `AgrichatError::Config` describing the first problem found
    ///
    /// # Examples
    ///
    /// ```
    /// use agrichat::config::Config;
    ///
    /// let mut config = Config::default();
    /// config.generator.direct.endpoint = "https://model.example/v1".to_string();
    /// config.generator.direct.api_key = "key".to_string();
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<()> {
        let has_direct = !self.generator.direct.endpoint.is_empty();
        let has_proxied = !self.generator.proxied.endpoint.is_empty();

        if !has_direct && !has_proxied {
            return Err(AgrichatError::Config(
                "No generative endpoint configured: set generator.direct.endpoint \
                 or generator.proxied.endpoint"
                    .to_string(),
            )
            .into());
        }

        if has_direct && self.generator.direct.api_key.is_empty() {
            return Err(AgrichatError::Config(
                "generator.direct.endpoint is set but generator.direct.api_key is empty"
                    .to_string(),
            )
            .into());
        }

        if self.chat.history_window == 0 {
            return Err(
                AgrichatError::Config("chat.history_window must be at least 1".to_string()).into(),
            );
        }

        if self.chat.title_max_len == 0 || self.chat.last_message_max_len == 0 {
            return Err(AgrichatError::Config(
                "chat truncation lengths must be at least 1".to_string(),
            )
            .into());
        }

        if self.chat.session_list_limit == 0 {
            return Err(AgrichatError::Config(
                "chat.session_list_limit must be at least 1".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_chat_config() {
        let chat = ChatConfig::default();
        assert_eq!(chat.history_window, 10);
        assert_eq!(chat.title_max_len, 50);
        assert_eq!(chat.last_message_max_len, 50);
        assert_eq!(chat.session_list_limit, 20);
        assert!(chat.language.is_none());
        assert!(!chat.system_prompt.is_empty());
        assert!(!chat.welcome_message.is_empty());
    }

    #[test]
    fn test_default_direct_config_generation_parameters() {
        let direct = DirectConfig::default();
        assert!((direct.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(direct.top_k, 40);
        assert!((direct.top_p - 0.95).abs() < f64::EPSILON);
        assert_eq!(direct.max_output_tokens, 1024);
    }

    #[test]
    fn test_validate_rejects_missing_endpoints() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_direct_without_key() {
        let mut config = Config::default();
        config.generator.direct.endpoint = "https://model.example/v1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_proxied_only() {
        let mut config = Config::default();
        config.generator.proxied.endpoint = "https://fn.example/chat".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::default();
        config.generator.proxied.endpoint = "https://fn.example/chat".to_string();
        config.chat.history_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "generator:\n  proxied:\n    endpoint: https://fn.example/chat\nchat:\n  history_window: 5\n  language: Swahili"
        )
        .expect("write config");

        let config = Config::load(file.path()).expect("load config");
        assert_eq!(
            config.generator.proxied.endpoint,
            "https://fn.example/chat"
        );
        assert_eq!(config.chat.history_window, 5);
        assert_eq!(config.chat.language.as_deref(), Some("Swahili"));
        // Unspecified fields keep their defaults
        assert_eq!(config.chat.title_max_len, 50);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = Config::load("/nonexistent/agrichat.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.generator.direct.endpoint = "https://model.example/v1".to_string();
        config.upload.public_base_url = "https://cdn.example".to_string();

        let yaml = serde_yaml::to_string(&config).expect("serialize");
        let parsed: Config = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(parsed.generator.direct.endpoint, "https://model.example/v1");
        assert_eq!(parsed.upload.public_base_url, "https://cdn.example");
    }
}
