//! Conversation composition
//!
//! Builds the bounded, ephemeral sequence of fragments sent to the
//! generative model for one turn: a fixed system prompt, the most recent
//! window of role-labeled history, and the new user input. The composed
//! history is recomputed per request and never persisted.

use crate::config::ChatConfig;
use crate::store::ChatMessage;

/// Author of a role-labeled history fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// User-authored turn
    User,
    /// Assistant-authored turn
    Assistant,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One fragment of a composed conversation
///
/// A tagged variant instead of an untyped list of text blobs, so
/// composition logic is exhaustive and testable without string parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// The fixed system prompt (language-wrapped when configured)
    SystemPrompt(String),
    /// A historical turn, rendered as `"<Assistant|User>: <text>"`
    RoleLabeled {
        /// Who authored the turn
        role: Role,
        /// The turn's text
        text: String,
    },
    /// Synthetic reference to an image a user message carried, placed
    /// immediately after that message's role-labeled fragment
    ImageReference(String),
    /// The new user input closing the composed history
    UserInput(String),
}

impl Fragment {
    /// Render this fragment to the plain text sent to the model
    ///
    /// # Examples
    ///
    /// ```
    /// use agrichat::composer::{Fragment, Role};
    ///
    /// let frag = Fragment::RoleLabeled { role: Role::Assistant, text: "Hi!".into() };
    /// assert_eq!(frag.render(), "Assistant: Hi!");
    ///
    /// let frag = Fragment::ImageReference("https://cdn/leaf.jpg".into());
    /// assert_eq!(frag.render(), "User image: https://cdn/leaf.jpg");
    /// ```
    pub fn render(&self) -> String {
        match self {
            Fragment::SystemPrompt(text) => text.clone(),
            Fragment::RoleLabeled { role, text } => format!("{}: {}", role.label(), text),
            Fragment::ImageReference(uri) => format!("User image: {}", uri),
            Fragment::UserInput(text) => text.clone(),
        }
    }
}

/// Assembles bounded conversation histories
///
/// Stateless apart from configuration: the same message list and input
/// always compose to the same fragments.
#[derive(Debug, Clone)]
pub struct Composer {
    system_prompt: String,
    language: Option<String>,
    window: usize,
}

impl Composer {
    /// Build a composer from the chat configuration
    pub fn new(chat: &ChatConfig) -> Self {
        Self {
            system_prompt: chat.system_prompt.clone(),
            language: chat.language.clone(),
            window: chat.history_window,
        }
    }

    /// Compose the model-visible conversation for one turn
    ///
    /// Output shape: `[SystemPrompt, ...windowed history, UserInput]`.
    /// Only the most recent `window` messages are considered, in their
    /// original (ascending) order; the welcome seed message is excluded
    /// even when it falls inside the window. A user message carrying an
    /// image contributes an extra [`Fragment::ImageReference`] directly
    /// after its role-labeled fragment. No de-duplication, no
    /// summarization: strictly a truncating window regardless of length.
    pub fn compose(&self, messages: &[ChatMessage], input: &str) -> Vec<Fragment> {
        let mut fragments = Vec::with_capacity(self.window + 2);
        fragments.push(Fragment::SystemPrompt(self.effective_system_prompt()));

        let start = messages.len().saturating_sub(self.window);
        for message in &messages[start..] {
            if message.is_welcome() {
                continue;
            }

            let role = if message.is_bot {
                Role::Assistant
            } else {
                Role::User
            };
            fragments.push(Fragment::RoleLabeled {
                role,
                text: message.text.clone(),
            });

            if !message.is_bot {
                // Prefer the durable URL; fall back to the display URI.
                if let Some(uri) = message.image_url.as_ref().or(message.image.as_ref()) {
                    fragments.push(Fragment::ImageReference(uri.clone()));
                }
            }
        }

        fragments.push(Fragment::UserInput(input.to_string()));
        fragments
    }

    /// The system prompt, wrapped with a language instruction when one is
    /// configured
    fn effective_system_prompt(&self) -> String {
        match &self.language {
            Some(language) => format!(
                "{}\n\nAlways answer in {}.",
                self.system_prompt, language
            ),
            None => self.system_prompt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChatMessage, WELCOME_MESSAGE_ID};
    use chrono::Utc;

    fn composer() -> Composer {
        Composer::new(&ChatConfig::default())
    }

    fn message(id: &str, text: &str, is_bot: bool) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            text: text.to_string(),
            is_bot,
            timestamp: Utc::now(),
            image: None,
            image_url: None,
        }
    }

    #[test]
    fn test_empty_history_is_prompt_plus_input() {
        let fragments = composer().compose(&[], "hello");
        assert_eq!(fragments.len(), 2);
        assert!(matches!(fragments[0], Fragment::SystemPrompt(_)));
        assert_eq!(fragments[1], Fragment::UserInput("hello".to_string()));
    }

    #[test]
    fn test_history_window_invariant() {
        // With N > 10 prior messages the composed history is exactly the
        // system prompt + the 10 most recent + the input.
        let messages: Vec<ChatMessage> = (0..25)
            .map(|i| message(&format!("m{}", i), &format!("text {}", i), i % 2 == 1))
            .collect();

        let fragments = composer().compose(&messages, "new input");
        assert_eq!(fragments.len(), 12);

        // Original order preserved: oldest in-window message first.
        assert_eq!(
            fragments[1],
            Fragment::RoleLabeled {
                role: Role::Assistant,
                text: "text 15".to_string()
            }
        );
        assert_eq!(
            fragments[10],
            Fragment::RoleLabeled {
                role: Role::User,
                text: "text 24".to_string()
            }
        );
        assert_eq!(fragments[11], Fragment::UserInput("new input".to_string()));
    }

    #[test]
    fn test_welcome_excluded_even_inside_window() {
        let messages = vec![
            message(WELCOME_MESSAGE_ID, "Hello! I'm AgriBot.", true),
            message("m1", "my maize has spots", false),
        ];

        let fragments = composer().compose(&messages, "what now?");
        assert_eq!(fragments.len(), 3);
        assert_eq!(
            fragments[1],
            Fragment::RoleLabeled {
                role: Role::User,
                text: "my maize has spots".to_string()
            }
        );
    }

    #[test]
    fn test_role_labels() {
        let messages = vec![
            message("m1", "question", false),
            message("m2", "answer", true),
        ];
        let fragments = composer().compose(&messages, "follow-up");

        assert_eq!(fragments[1].render(), "User: question");
        assert_eq!(fragments[2].render(), "Assistant: answer");
    }

    #[test]
    fn test_image_reference_follows_user_fragment() {
        let mut with_image = message("m1", "what is wrong with this leaf?", false);
        with_image.image = Some("file:///tmp/leaf.jpg".to_string());
        with_image.image_url = Some("https://cdn.example/leaf.jpg".to_string());

        let messages = vec![with_image, message("m2", "looks like blight", true)];
        let fragments = composer().compose(&messages, "thanks");

        assert_eq!(
            fragments[1],
            Fragment::RoleLabeled {
                role: Role::User,
                text: "what is wrong with this leaf?".to_string()
            }
        );
        // Durable URL preferred, placed immediately after the message.
        assert_eq!(
            fragments[2],
            Fragment::ImageReference("https://cdn.example/leaf.jpg".to_string())
        );
        assert_eq!(
            fragments[3],
            Fragment::RoleLabeled {
                role: Role::Assistant,
                text: "looks like blight".to_string()
            }
        );
    }

    #[test]
    fn test_image_reference_falls_back_to_display_uri() {
        let mut with_image = message("m1", "see this", false);
        with_image.image = Some("file:///tmp/pic.jpg".to_string());

        let fragments = composer().compose(&[with_image], "and?");
        assert_eq!(
            fragments[2],
            Fragment::ImageReference("file:///tmp/pic.jpg".to_string())
        );
    }

    #[test]
    fn test_bot_image_fields_ignored() {
        let mut bot = message("m1", "here you go", true);
        bot.image_url = Some("https://cdn.example/diagram.jpg".to_string());

        let fragments = composer().compose(&[bot], "ok");
        assert_eq!(fragments.len(), 3);
        assert!(!fragments
            .iter()
            .any(|f| matches!(f, Fragment::ImageReference(_))));
    }

    #[test]
    fn test_language_wrapping() {
        let mut config = ChatConfig::default();
        config.language = Some("Swahili".to_string());
        let composer = Composer::new(&config);

        let fragments = composer.compose(&[], "habari");
        let Fragment::SystemPrompt(prompt) = &fragments[0] else {
            panic!("expected system prompt first");
        };
        assert!(prompt.contains("Always answer in Swahili."));
        assert!(prompt.starts_with(&ChatConfig::default().system_prompt));
    }

    #[test]
    fn test_no_language_leaves_prompt_untouched() {
        let fragments = composer().compose(&[], "hi");
        let Fragment::SystemPrompt(prompt) = &fragments[0] else {
            panic!("expected system prompt first");
        };
        assert_eq!(prompt, &ChatConfig::default().system_prompt);
    }

    #[test]
    fn test_window_smaller_than_history_keeps_order() {
        let mut config = ChatConfig::default();
        config.history_window = 3;
        let composer = Composer::new(&config);

        let messages: Vec<ChatMessage> = (0..5)
            .map(|i| message(&format!("m{}", i), &format!("t{}", i), false))
            .collect();
        let fragments = composer.compose(&messages, "in");

        let texts: Vec<String> = fragments.iter().map(Fragment::render).collect();
        assert_eq!(texts[1], "User: t2");
        assert_eq!(texts[2], "User: t3");
        assert_eq!(texts[3], "User: t4");
    }
}
