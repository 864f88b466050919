//! Direct-mode generative endpoint adapter
//!
//! Issues the model request ourselves: the composed conversation becomes
//! the request's text parts, generation parameters and safety thresholds
//! are fixed, and the first candidate's first text part is the reply.
//! Retryable transport failures (5xx, timeout) get a bounded retry with
//! backoff; client errors never retry.

use crate::config::DirectConfig;
use crate::error::{AgrichatError, Result};
use crate::providers::base::{GenerateRequest, Generator, REFUSAL_FALLBACK};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Role-label echo some models prepend to their reply
const ASSISTANT_ECHO_PREFIX: &str = "Assistant: ";

/// Safety categories blocked at medium and above
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";

/// Base delay between retry attempts, doubled per attempt
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Direct HTTP adapter for the generative endpoint
pub struct DirectGenerator {
    client: Client,
    config: DirectConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: String,
    threshold: String,
}

#[derive(Debug, Deserialize)]
struct ModelResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl DirectGenerator {
    /// Create a new direct-mode adapter
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: DirectConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("agrichat/0.1.0")
            .build()
            .map_err(|e| {
                AgrichatError::Transport(format!("Failed to create HTTP client: {}", e))
            })?;

        tracing::info!(endpoint = %config.endpoint, "initialized direct generator");
        Ok(Self { client, config })
    }

    fn request_body(&self, request: &GenerateRequest) -> ModelRequest {
        let parts = request
            .fragments
            .iter()
            .map(|f| Part { text: f.render() })
            .collect();

        ModelRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_k: self.config.top_k,
                top_p: self.config.top_p,
                max_output_tokens: self.config.max_output_tokens,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category: (*category).to_string(),
                    threshold: SAFETY_THRESHOLD.to_string(),
                })
                .collect(),
        }
    }

    /// Extract the reply text from a successful response
    ///
    /// Absent candidates or parts become the refusal stand-in, and a
    /// leading role-label echo is stripped.
    fn extract_text(response: ModelResponse) -> String {
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text);

        match text {
            Some(text) => text
                .strip_prefix(ASSISTANT_ECHO_PREFIX)
                .map(str::to_string)
                .unwrap_or(text),
            None => REFUSAL_FALLBACK.to_string(),
        }
    }

    /// Best-effort human-readable message from an error body
    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("Model endpoint returned status {}", status))
    }
}

#[async_trait]
impl Generator for DirectGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let url = format!("{}?key={}", self.config.endpoint, self.config.api_key);
        let body = self.request_body(request);

        let mut attempt: u32 = 0;
        loop {
            tracing::debug!(attempt, "calling direct model endpoint");
            let outcome = self.client.post(&url).json(&body).send().await;

            match outcome {
                Ok(response) if response.status().is_success() => {
                    let parsed: ModelResponse = response.json().await.map_err(|e| {
                        AgrichatError::Transport(format!("Malformed model response: {}", e))
                    })?;
                    return Ok(Self::extract_text(parsed));
                }
                Ok(response) => {
                    let status = response.status();
                    let retryable = status.is_server_error();
                    let message = Self::error_message(response).await;

                    if retryable && attempt < self.config.max_retries {
                        tracing::warn!(%status, attempt, "retryable model endpoint failure");
                        tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    tracing::error!(%status, "model endpoint failure: {}", message);
                    return Err(AgrichatError::Transport(message).into());
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    if retryable && attempt < self.config.max_retries {
                        tracing::warn!(attempt, "retryable transport failure: {}", e);
                        tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(
                        AgrichatError::Transport(format!("Model request failed: {}", e)).into(),
                    );
                }
            }
        }
    }
}
