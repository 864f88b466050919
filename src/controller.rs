//! Session orchestration
//!
//! The controller mediates between the UI, the message store, the
//! attachment uploader, and the generative adapter. All ambient state is
//! explicit: every operation takes the user id and session id as
//! parameters, so the embedding UI owns "current user" and "current
//! session" and the controller stays trivially testable.

use crate::composer::Composer;
use crate::config::ChatConfig;
use crate::error::{classify, AgrichatError, ErrorKind, Result};
use crate::providers::{GenerateRequest, Generator, HistoryEntry};
use crate::store::{
    ChatMessage, ChatStore, NewMessage, SessionSummary, Subscription,
};
use crate::upload::AttachmentUploader;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A locally-selected image pending upload
#[derive(Debug, Clone)]
pub struct PendingImage {
    /// Local display URI (not durable)
    pub local_uri: String,
    /// JPEG bytes to upload
    pub data: Bytes,
}

/// The two messages a completed turn produced
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The persisted user message
    pub user_message: ChatMessage,
    /// The persisted assistant reply
    pub bot_message: ChatMessage,
}

/// Orchestrates session lifecycle and turn-taking
pub struct SessionController {
    store: Arc<ChatStore>,
    generator: Arc<dyn Generator>,
    uploader: Option<Arc<AttachmentUploader>>,
    composer: Composer,
    welcome_message: String,
    history_window: usize,
    in_flight: Mutex<HashSet<(String, String)>>,
}

/// Removes a session's in-flight marker when the turn ends, however it
/// ends.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<(String, String)>>,
    key: (String, String),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

impl SessionController {
    /// Create a new controller
    ///
    /// The uploader is optional; a turn that attaches an image without one
    /// configured fails with a configuration error.
    pub fn new(
        store: Arc<ChatStore>,
        generator: Arc<dyn Generator>,
        uploader: Option<Arc<AttachmentUploader>>,
        chat: &ChatConfig,
    ) -> Self {
        Self {
            store,
            generator,
            uploader,
            composer: Composer::new(chat),
            welcome_message: chat.welcome_message.clone(),
            history_window: chat.history_window,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Start a new conversation
    ///
    /// Creates the session record with the sentinel title and persists the
    /// welcome seed message. The returned summary is what the caller
    /// should treat as "current".
    pub async fn start_new_chat(&self, user_id: &str) -> Result<SessionSummary> {
        let session = self.store.create_session(user_id)?;
        self.store.append_message(
            user_id,
            &session.id,
            NewMessage::welcome(self.welcome_message.clone()),
        )?;

        // Secondary write: a stale snapshot is acceptable, the session
        // itself is already usable.
        if let Err(e) = self
            .store
            .update_summary(user_id, &session.id, &self.welcome_message, false)
        {
            tracing::warn!(user_id, session_id = %session.id, "welcome summary update failed: {}", e);
        }

        tracing::info!(user_id, session_id = %session.id, "started new chat");
        self.store
            .get_session(user_id, &session.id)?
            .ok_or_else(|| {
                AgrichatError::Storage(format!("Session {} vanished after creation", session.id))
                    .into()
            })
    }

    /// Open a session for viewing
    ///
    /// Returns a live subscription to the session's ordered message list.
    /// Taking out a new subscription for the same session replaces any
    /// prior one, so at most one is live per session view.
    pub async fn load_chat(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Subscription<Vec<ChatMessage>>> {
        if self.store.get_session(user_id, session_id)?.is_none() {
            return Err(
                AgrichatError::Storage(format!("Session {} not found", session_id)).into(),
            );
        }
        self.store.subscribe_messages(user_id, session_id)
    }

    /// Subscribe to the user's capped, recency-ordered session directory
    pub fn session_directory(&self, user_id: &str) -> Result<Subscription<Vec<SessionSummary>>> {
        self.store.subscribe_sessions(user_id)
    }

    /// Run one user turn: persist the user message, generate the reply,
    /// persist it
    ///
    /// A second call for the same session while a turn is in flight is
    /// rejected with `AgrichatError::TurnInFlight`. An upload failure
    /// aborts the turn before anything is persisted, so the caller can
    /// keep the pending text and image for resubmission. A generator or
    /// persistence failure after the user message was written leaves that
    /// message intact and persists no bot reply.
    pub async fn send_user_turn(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        image: Option<PendingImage>,
    ) -> Result<TurnOutcome> {
        let _guard = self.begin_turn(user_id, session_id)?;

        if self.store.get_session(user_id, session_id)?.is_none() {
            return Err(
                AgrichatError::Storage(format!("Session {} not found", session_id)).into(),
            );
        }

        // Step 1: move the attachment into durable storage first; nothing
        // is persisted if this fails.
        let durable_url = match &image {
            Some(pending) => {
                let uploader = self.uploader.as_ref().ok_or_else(|| {
                    AgrichatError::Config("No attachment uploader configured".to_string())
                })?;
                Some(uploader.upload(user_id, pending.data.clone()).await?)
            }
            None => None,
        };

        // History is read before the new user message is written: the
        // composer receives prior messages plus the input separately.
        let prior = self.store.messages(user_id, session_id)?;

        // Step 2: persist the user message (fatal on failure).
        let mut new_message = NewMessage::user(text);
        if let (Some(pending), Some(url)) = (&image, &durable_url) {
            new_message = new_message.with_image(pending.local_uri.clone(), url.clone());
        }
        let user_message = self
            .store
            .append_message(user_id, session_id, new_message)?;

        // Step 3: summary update is a non-fatal secondary write.
        if let Err(e) = self
            .store
            .update_summary(user_id, session_id, &user_message.text, true)
        {
            tracing::warn!(user_id, session_id, "summary update failed: {}", e);
        }

        // Steps 4-5: compose the bounded history and invoke the model.
        let fragments = self.composer.compose(&prior, &user_message.text);
        let history = self.proxied_history(&prior);
        let request = GenerateRequest {
            fragments,
            text: user_message.text.clone(),
            image_url: durable_url,
            history,
        };

        let reply = self.generator.generate(&request).await?;

        // Step 6: persist the reply (fatal on failure; the user message
        // stays).
        let bot_message = self
            .store
            .append_message(user_id, session_id, NewMessage::bot(reply))?;

        // Step 7: second non-fatal summary update; never touches the
        // title.
        if let Err(e) = self
            .store
            .update_summary(user_id, session_id, &bot_message.text, false)
        {
            tracing::warn!(user_id, session_id, "summary update failed: {}", e);
        }

        Ok(TurnOutcome {
            user_message,
            bot_message,
        })
    }

    /// Delete a session and all of its messages
    ///
    /// If the deleted session was the caller's "current" one, the caller
    /// starts a replacement via [`Self::start_new_chat`]; current-session
    /// state lives with the embedder, not here.
    pub async fn delete_chat(&self, user_id: &str, session_id: &str) -> Result<()> {
        self.store.delete_session(user_id, session_id)?;
        tracing::info!(user_id, session_id, "deleted chat");
        Ok(())
    }

    /// The trailing history window in the proxied callable's shape
    fn proxied_history(&self, prior: &[ChatMessage]) -> Vec<HistoryEntry> {
        let start = prior.len().saturating_sub(self.history_window);
        prior[start..]
            .iter()
            .filter(|m| !m.is_welcome())
            .map(HistoryEntry::from)
            .collect()
    }

    /// Mark a session's turn as in flight, rejecting a concurrent one
    fn begin_turn(&self, user_id: &str, session_id: &str) -> Result<InFlightGuard<'_>> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| AgrichatError::Storage("in-flight registry poisoned".into()))?;
        let key = (user_id.to_string(), session_id.to_string());
        if !set.insert(key.clone()) {
            return Err(AgrichatError::TurnInFlight(session_id.to_string()).into());
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            key,
        })
    }
}

/// Map a failed turn to the single user-visible notification the UI shows
///
/// Distinguishes image-analysis failures and upload failures from general
/// ones, per the turn-failure reporting contract.
pub fn turn_failure_message(err: &anyhow::Error) -> String {
    match classify(err) {
        ErrorKind::ImageAnalysis => {
            "Sorry, I couldn't analyze that image. Please try a different photo.".to_string()
        }
        ErrorKind::Upload => {
            "Image upload failed. Please check your connection and try again.".to_string()
        }
        ErrorKind::TurnInFlight => {
            "Please wait for the current reply to finish.".to_string()
        }
        _ => "Something went wrong. Please try again.".to_string(),
    }
}
