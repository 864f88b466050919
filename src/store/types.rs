//! Record types for the message store and session directory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel id of the seed message written when a session is created.
///
/// The welcome message is persisted like any other message but is never
/// included in a composed conversation history.
pub const WELCOME_MESSAGE_ID: &str = "welcome";

/// Placeholder title a session carries until the first user message arrives
pub const SENTINEL_TITLE: &str = "New Chat";

/// Placeholder text substituted when a message carries only an image
pub const IMAGE_ONLY_TEXT: &str = "Please analyze this image.";

/// Ellipsis marker appended to truncated last-message snapshots
pub const ELLIPSIS: &str = "...";

/// A persisted chat message
///
/// Messages are immutable once written and are always read back in strict
/// ascending timestamp order within their session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Store-assigned identifier (ULID, or the welcome sentinel)
    pub id: String,
    /// Message text (never empty: image-only sends get a placeholder)
    pub text: String,
    /// True for assistant-authored turns
    pub is_bot: bool,
    /// Store-assigned write timestamp
    pub timestamp: DateTime<Utc>,
    /// Local display URI, client-only and not guaranteed durable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Durable object-storage URL, used as model input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ChatMessage {
    /// Whether this is the persisted welcome seed message
    pub fn is_welcome(&self) -> bool {
        self.id == WELCOME_MESSAGE_ID
    }
}

/// A message to be appended to a session
///
/// The store assigns the id (unless a sentinel is supplied) and the
/// timestamp at write time.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Explicit id override (used only for the welcome sentinel)
    pub id: Option<String>,
    /// Message text
    pub text: String,
    /// True for assistant-authored turns
    pub is_bot: bool,
    /// Local display URI
    pub image: Option<String>,
    /// Durable object-storage URL
    pub image_url: Option<String>,
}

impl NewMessage {
    /// A user-authored message
    ///
    /// # Examples
    ///
    /// ```
    /// use agrichat::store::NewMessage;
    ///
    /// let msg = NewMessage::user("How do I treat blight?");
    /// assert!(!msg.is_bot);
    /// ```
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            is_bot: false,
            image: None,
            image_url: None,
        }
    }

    /// An assistant-authored message
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            is_bot: true,
            image: None,
            image_url: None,
        }
    }

    /// The welcome seed message, carrying the sentinel id
    pub fn welcome(text: impl Into<String>) -> Self {
        Self {
            id: Some(WELCOME_MESSAGE_ID.to_string()),
            text: text.into(),
            is_bot: true,
            image: None,
            image_url: None,
        }
    }

    /// Attach an image to this message
    ///
    /// Substitutes the image-only placeholder when the text is empty.
    pub fn with_image(mut self, display_uri: impl Into<String>, durable_url: impl Into<String>) -> Self {
        self.image = Some(display_uri.into());
        self.image_url = Some(durable_url.into());
        if self.text.trim().is_empty() {
            self.text = IMAGE_ONLY_TEXT.to_string();
        }
        self
    }
}

/// Summary of a session as shown in the session directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier (ULID)
    pub id: String,
    /// Session title (sentinel until derived from the first user message)
    pub title: String,
    /// Truncated snapshot of the most recent message text
    pub last_message: String,
    /// When the most recent message was written
    pub last_message_time: DateTime<Utc>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
}

impl SessionSummary {
    /// Whether the title is still the creation-time placeholder
    pub fn has_sentinel_title(&self) -> bool {
        self.title == SENTINEL_TITLE
    }
}

/// Truncate a string to `max` characters, appending an ellipsis marker
/// when anything was cut
///
/// The truncated output is always a character prefix of the input followed
/// by the marker, and never exceeds `max` plus the marker length.
///
/// # Examples
///
/// ```
/// use agrichat::store::truncate_with_ellipsis;
///
/// assert_eq!(truncate_with_ellipsis("short", 10), "short");
/// assert_eq!(truncate_with_ellipsis("a longer input", 8), "a longer...");
/// ```
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(max).collect();
        truncated.push_str(ELLIPSIS);
        truncated
    }
}

/// Derive a session title from the first user message
///
/// Titles are a plain character prefix with no marker, trimmed of
/// surrounding whitespace.
pub fn derive_title(text: &str, max: usize) -> String {
    text.trim().chars().take(max).collect::<String>().trim_end().to_string()
}
