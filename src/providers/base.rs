//! Generator trait and common request types
//!
//! Defines the `Generator` trait every generative-call adapter implements,
//! plus the request shape shared between the direct endpoint and the
//! proxied callable.

use crate::composer::Fragment;
use crate::error::Result;
use crate::store::ChatMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stand-in reply used when the model declines to answer
///
/// A declined answer is not an error: adapters return this string instead
/// of rejecting, so only transport- or auth-level failures propagate.
pub const REFUSAL_FALLBACK: &str =
    "Sorry, I couldn't generate a response. Please try asking again.";

/// One history entry in the proxied callable's wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Turn text
    pub text: String,
    /// True for assistant-authored turns
    pub is_bot: bool,
    /// Write timestamp of the persisted message
    pub timestamp: DateTime<Utc>,
}

impl From<&ChatMessage> for HistoryEntry {
    fn from(message: &ChatMessage) -> Self {
        Self {
            text: message.text.clone(),
            is_bot: message.is_bot,
            timestamp: message.timestamp,
        }
    }
}

/// A single generation request
///
/// Carries both call shapes: the direct endpoint consumes the rendered
/// `fragments`; the proxied callable consumes `text`, `history`, and
/// `image_url`.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Composed conversation fragments (direct mode)
    pub fragments: Vec<Fragment>,
    /// Raw user input (proxied mode)
    pub text: String,
    /// Durable URL of an attached image, if any
    pub image_url: Option<String>,
    /// Trailing chat history (proxied mode)
    pub history: Vec<HistoryEntry>,
}

impl GenerateRequest {
    /// A copy of this request with the image dropped
    ///
    /// Used when falling back to the direct text-only call: the durable
    /// URL and any image-reference fragments are removed.
    pub fn without_image(&self) -> Self {
        Self {
            fragments: self
                .fragments
                .iter()
                .filter(|f| !matches!(f, Fragment::ImageReference(_)))
                .cloned()
                .collect(),
            text: self.text.clone(),
            image_url: None,
            history: self.history.clone(),
        }
    }
}

/// Generative-call adapter
///
/// Implementations normalize the model's output into plain text. A model
/// that returns no usable text yields [`REFUSAL_FALLBACK`] rather than an
/// error; only transport/auth failures reject.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply for the composed conversation
    ///
    /// # Errors
    ///
    /// Returns error for transport-level or authentication-level
    /// failures, classified via `error::classify`.
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Role;

    #[test]
    fn test_history_entry_from_message() {
        let message = ChatMessage {
            id: "m1".to_string(),
            text: "hello".to_string(),
            is_bot: true,
            timestamp: Utc::now(),
            image: None,
            image_url: None,
        };
        let entry = HistoryEntry::from(&message);
        assert_eq!(entry.text, "hello");
        assert!(entry.is_bot);
    }

    #[test]
    fn test_history_entry_wire_format_is_camel_case() {
        let entry = HistoryEntry {
            text: "hi".to_string(),
            is_bot: false,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        assert!(json.contains("\"isBot\":false"));
        assert!(json.contains("\"timestamp\""));
    }

    #[test]
    fn test_without_image_strips_url_and_references() {
        let request = GenerateRequest {
            fragments: vec![
                Fragment::SystemPrompt("prompt".to_string()),
                Fragment::RoleLabeled {
                    role: Role::User,
                    text: "look".to_string(),
                },
                Fragment::ImageReference("https://cdn/leaf.jpg".to_string()),
                Fragment::UserInput("what is it?".to_string()),
            ],
            text: "what is it?".to_string(),
            image_url: Some("https://cdn/leaf.jpg".to_string()),
            history: vec![],
        };

        let stripped = request.without_image();
        assert!(stripped.image_url.is_none());
        assert_eq!(stripped.fragments.len(), 3);
        assert!(!stripped
            .fragments
            .iter()
            .any(|f| matches!(f, Fragment::ImageReference(_))));
        assert_eq!(stripped.text, "what is it?");
    }
}
