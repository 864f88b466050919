//! Proxied callable adapter
//!
//! Delegates generation to a backend callable function which performs the
//! model invocation server-side. This is what enables multimodal image
//! analysis: the callable fetches the durable image URL and attaches it as
//! inline binary data, selecting a vision-capable model when an image is
//! present. Failures come back with a machine-readable code that maps onto
//! the structured error taxonomy (no message-text inspection).

use crate::config::ProxiedConfig;
use crate::error::{AgrichatError, Result};
use crate::providers::base::{GenerateRequest, Generator, HistoryEntry, REFUSAL_FALLBACK};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error code the callable uses for unauthenticated invocations
const CODE_UNAUTHENTICATED: &str = "unauthenticated";

/// Error code the callable uses for image-analysis failures
const CODE_IMAGE_ANALYSIS: &str = "image-analysis-failed";

/// Adapter for the backend callable function
pub struct ProxiedGenerator {
    client: Client,
    config: ProxiedConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallableRequest<'a> {
    text: &'a str,
    chat_history: &'a [HistoryEntry],
    image_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CallableResponse {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallableError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ProxiedGenerator {
    /// Create a new proxied adapter
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: ProxiedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("agrichat/0.1.0")
            .build()
            .map_err(|e| {
                AgrichatError::Transport(format!("Failed to create HTTP client: {}", e))
            })?;

        tracing::info!(endpoint = %config.endpoint, "initialized proxied generator");
        Ok(Self { client, config })
    }

    /// Map the callable's error surface to the structured taxonomy
    async fn classify_failure(response: reqwest::Response) -> AgrichatError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<CallableError> = serde_json::from_str(&body).ok();

        let code = parsed.as_ref().and_then(|e| e.code.as_deref());
        let message = parsed
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| format!("Callable returned status {}", status));

        match code {
            Some(CODE_UNAUTHENTICATED) => AgrichatError::Auth(message),
            Some(CODE_IMAGE_ANALYSIS) => AgrichatError::ImageAnalysis(message),
            _ if status == reqwest::StatusCode::UNAUTHORIZED => AgrichatError::Auth(message),
            _ => AgrichatError::Transport(message),
        }
    }
}

#[async_trait]
impl Generator for ProxiedGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let body = CallableRequest {
            text: &request.text,
            chat_history: &request.history,
            image_url: request.image_url.as_deref(),
        };

        tracing::debug!(
            has_image = request.image_url.is_some(),
            history_len = request.history.len(),
            "invoking proxied callable"
        );

        let mut outgoing = self.client.post(&self.config.endpoint).json(&body);
        if let Some(token) = &self.config.auth_token {
            outgoing = outgoing.bearer_auth(token);
        }

        let response = outgoing.send().await.map_err(|e| {
            AgrichatError::Transport(format!("Callable request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let error = Self::classify_failure(response).await;
            tracing::warn!("proxied callable failure: {}", error);
            return Err(error.into());
        }

        let parsed: CallableResponse = response.json().await.map_err(|e| {
            AgrichatError::Transport(format!("Malformed callable response: {}", e))
        })?;

        Ok(parsed
            .response
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| REFUSAL_FALLBACK.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorKind};
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: String) -> ProxiedConfig {
        ProxiedConfig {
            endpoint,
            auth_token: Some("caller-token".to_string()),
            timeout_seconds: 5,
        }
    }

    fn test_request(image: Option<&str>) -> GenerateRequest {
        GenerateRequest {
            fragments: vec![],
            text: "what is wrong with my maize?".to_string(),
            image_url: image.map(str::to_string),
            history: vec![HistoryEntry {
                text: "hi".to_string(),
                is_bot: false,
                timestamp: Utc::now(),
            }],
        }
    }

    #[tokio::test]
    async fn test_generate_sends_callable_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(header("authorization", "Bearer caller-token"))
            .and(body_partial_json(json!({
                "text": "what is wrong with my maize?",
                "imageUrl": "https://cdn/leaf.jpg"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"response": "Looks like rust."})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let generator =
            ProxiedGenerator::new(test_config(format!("{}/chat", server.uri()))).expect("build");
        let reply = generator
            .generate(&test_request(Some("https://cdn/leaf.jpg")))
            .await
            .expect("generate");
        assert_eq!(reply, "Looks like rust.");
    }

    #[tokio::test]
    async fn test_empty_response_becomes_refusal_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": ""})))
            .mount(&server)
            .await;

        let generator =
            ProxiedGenerator::new(test_config(format!("{}/chat", server.uri()))).expect("build");
        let reply = generator
            .generate(&test_request(None))
            .await
            .expect("generate");
        assert_eq!(reply, REFUSAL_FALLBACK);
    }

    #[tokio::test]
    async fn test_unauthenticated_code_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"code": "unauthenticated", "message": "No caller identity"}),
            ))
            .mount(&server)
            .await;

        let generator =
            ProxiedGenerator::new(test_config(format!("{}/chat", server.uri()))).expect("build");
        let err = generator
            .generate(&test_request(None))
            .await
            .expect_err("should fail");
        assert_eq!(classify(&err), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_image_analysis_code_maps_to_image_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(
                json!({"code": "image-analysis-failed", "message": "Could not fetch image"}),
            ))
            .mount(&server)
            .await;

        let generator =
            ProxiedGenerator::new(test_config(format!("{}/chat", server.uri()))).expect("build");
        let err = generator
            .generate(&test_request(Some("https://cdn/leaf.jpg")))
            .await
            .expect_err("should fail");
        assert_eq!(classify(&err), ErrorKind::ImageAnalysis);
    }

    #[tokio::test]
    async fn test_unknown_failure_maps_to_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
            .mount(&server)
            .await;

        let generator =
            ProxiedGenerator::new(test_config(format!("{}/chat", server.uri()))).expect("build");
        let err = generator
            .generate(&test_request(None))
            .await
            .expect_err("should fail");
        assert_eq!(classify(&err), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_bare_401_maps_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let generator =
            ProxiedGenerator::new(test_config(format!("{}/chat", server.uri()))).expect("build");
        let err = generator
            .generate(&test_request(None))
            .await
            .expect_err("should fail");
        assert_eq!(classify(&err), ErrorKind::Auth);
    }
}
