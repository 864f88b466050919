//! Message store and session directory
//!
//! Persists sessions and their ordered, append-only messages in SQLite and
//! serves the live-subscription views the UI renders from: the per-session
//! message list (ascending by write time) and the per-user session
//! directory (descending by recency, capped).

use crate::config::ChatConfig;
use crate::error::{AgrichatError, Result};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::watch;
use ulid::Ulid;

pub mod subscription;
pub mod types;

pub use subscription::Subscription;
pub use types::{
    derive_title, truncate_with_ellipsis, ChatMessage, NewMessage, SessionSummary, ELLIPSIS,
    IMAGE_ONLY_TEXT, SENTINEL_TITLE, WELCOME_MESSAGE_ID,
};

type MessageWatchers = Mutex<HashMap<(String, String), watch::Sender<Vec<ChatMessage>>>>;
type DirectoryWatchers = Mutex<HashMap<String, watch::Sender<Vec<SessionSummary>>>>;

/// Storage backend for chat sessions and messages
///
/// Each operation opens its own connection; SQLite's per-statement
/// atomicity covers the multi-writer case, so no client-side locking is
/// needed for the data itself. Watcher registries are the only shared
/// mutable state.
pub struct ChatStore {
    db_path: PathBuf,
    title_max_len: usize,
    last_message_max_len: usize,
    session_list_limit: usize,
    message_watchers: MessageWatchers,
    directory_watchers: DirectoryWatchers,
}

impl ChatStore {
    /// Create a store backed by the default database location
    ///
    /// The path can be overridden with the `AGRICHAT_DB` environment
    /// variable, which makes it easy to point at a test database without
    /// touching the user's application data dir.
    pub fn new(chat: &ChatConfig) -> Result<Self> {
        if let Ok(override_path) = std::env::var("AGRICHAT_DB") {
            return Self::new_with_path(override_path, chat);
        }

        let proj_dirs = ProjectDirs::from("com", "agrichat", "agrichat")
            .ok_or_else(|| AgrichatError::Storage("Could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        Self::new_with_path(data_dir.join("chat.db"), chat)
    }

    /// Create a store that uses the specified database path
    ///
    /// # Examples
    ///
    /// ```
    /// use agrichat::config::ChatConfig;
    /// use agrichat::store::ChatStore;
    ///
    /// let store = ChatStore::new_with_path("/tmp/agrichat_doc_test.db", &ChatConfig::default());
    /// assert!(store.is_ok());
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P, chat: &ChatConfig) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| AgrichatError::Storage(e.to_string()))?;
        }

        let store = Self {
            db_path,
            title_max_len: chat.title_max_len,
            last_message_max_len: chat.last_message_max_len,
            session_list_limit: chat.session_list_limit,
            message_watchers: Mutex::new(HashMap::new()),
            directory_watchers: Mutex::new(HashMap::new()),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                user_id TEXT NOT NULL,
                id TEXT NOT NULL,
                title TEXT NOT NULL,
                last_message TEXT NOT NULL,
                last_message_time TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, id)
            )",
            [],
        )
        .context("Failed to create sessions table")
        .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                text TEXT NOT NULL,
                is_bot INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                image TEXT,
                image_url TEXT
            )",
            [],
        )
        .context("Failed to create messages table")
        .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| AgrichatError::Storage(e.to_string()).into())
    }

    /// Create a new session with the sentinel title
    ///
    /// The session starts with an empty last-message snapshot; the caller
    /// is expected to append the welcome seed message next.
    pub fn create_session(&self, user_id: &str) -> Result<SessionSummary> {
        let now = Utc::now();
        let session = SessionSummary {
            id: Ulid::new().to_string(),
            title: SENTINEL_TITLE.to_string(),
            last_message: String::new(),
            last_message_time: now,
            created_at: now,
        };

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO sessions (user_id, id, title, last_message, last_message_time, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                user_id,
                session.id,
                session.title,
                session.last_message,
                to_rfc3339(&session.last_message_time),
                to_rfc3339(&session.created_at),
            ],
        )
        .context("Failed to insert session")
        .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        tracing::debug!(user_id, session_id = %session.id, "created session");
        self.notify_directory(user_id);
        Ok(session)
    }

    /// Look up a session by id
    ///
    /// Works for any session the user owns, including ones that have
    /// fallen outside the capped directory view.
    pub fn get_session(&self, user_id: &str, session_id: &str) -> Result<Option<SessionSummary>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, title, last_message, last_message_time, created_at
                 FROM sessions WHERE user_id = ? AND id = ?",
                params![user_id, session_id],
                session_from_row,
            )
            .optional()
            .context("Failed to query session")
            .map_err(|e| AgrichatError::Storage(e.to_string()))?;
        Ok(row)
    }

    /// List the user's sessions, most recently updated first
    ///
    /// The list is capped: older sessions become invisible to this view
    /// but remain retrievable by id.
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, last_message, last_message_time, created_at
                 FROM sessions WHERE user_id = ?
                 ORDER BY last_message_time DESC, id DESC
                 LIMIT ?",
            )
            .context("Failed to prepare statement")
            .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![user_id, self.session_list_limit as i64], |row| {
                session_from_row(row)
            })
            .context("Failed to query sessions")
            .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        let mut sessions = Vec::new();
        for row in rows {
            let session = row
                .context("Failed to read session row")
                .map_err(|e| AgrichatError::Storage(e.to_string()))?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    /// Append a message to a session
    ///
    /// Assigns the id (unless the sentinel is supplied) and the timestamp
    /// at write time; the row's insertion sequence breaks timestamp ties
    /// so read-back order is total. Fails if the session does not exist.
    pub fn append_message(
        &self,
        user_id: &str,
        session_id: &str,
        new: NewMessage,
    ) -> Result<ChatMessage> {
        if self.get_session(user_id, session_id)?.is_none() {
            return Err(AgrichatError::Storage(format!(
                "Cannot append message: session {} not found",
                session_id
            ))
            .into());
        }

        let message = ChatMessage {
            id: new.id.unwrap_or_else(|| Ulid::new().to_string()),
            text: new.text,
            is_bot: new.is_bot,
            timestamp: Utc::now(),
            image: new.image,
            image_url: new.image_url,
        };

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO messages (id, user_id, session_id, text, is_bot, timestamp, image, image_url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                message.id,
                user_id,
                session_id,
                message.text,
                message.is_bot,
                to_rfc3339(&message.timestamp),
                message.image,
                message.image_url,
            ],
        )
        .context("Failed to insert message")
        .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        tracing::debug!(
            user_id,
            session_id,
            message_id = %message.id,
            is_bot = message.is_bot,
            "appended message"
        );
        self.notify_messages(user_id, session_id);
        Ok(message)
    }

    /// Read a session's messages in strict ascending write order
    pub fn messages(&self, user_id: &str, session_id: &str) -> Result<Vec<ChatMessage>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, text, is_bot, timestamp, image, image_url
                 FROM messages WHERE user_id = ? AND session_id = ?
                 ORDER BY timestamp ASC, seq ASC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![user_id, session_id], |row| {
                let timestamp_str: String = row.get(3)?;
                Ok(ChatMessage {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    is_bot: row.get(2)?,
                    timestamp: parse_rfc3339(&timestamp_str),
                    image: row.get(4)?,
                    image_url: row.get(5)?,
                })
            })
            .context("Failed to query messages")
            .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        let mut messages = Vec::new();
        for row in rows {
            let message = row
                .context("Failed to read message row")
                .map_err(|e| AgrichatError::Storage(e.to_string()))?;
            messages.push(message);
        }
        Ok(messages)
    }

    /// Update a session's last-message snapshot, and derive the title when
    /// it is still the sentinel and the text came from the user
    ///
    /// Bot replies never change the title. Callers on the turn path treat
    /// a failure here as non-fatal (log and continue).
    pub fn update_summary(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        from_user: bool,
    ) -> Result<()> {
        let conn = self.open()?;

        let current_title: Option<String> = conn
            .query_row(
                "SELECT title FROM sessions WHERE user_id = ? AND id = ?",
                params![user_id, session_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read session title")
            .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        let current_title = current_title.ok_or_else(|| {
            AgrichatError::Storage(format!("Session {} not found", session_id))
        })?;

        let last_message = truncate_with_ellipsis(text, self.last_message_max_len);
        let now = to_rfc3339(&Utc::now());

        if from_user && current_title == SENTINEL_TITLE {
            let title = derive_title(text, self.title_max_len);
            conn.execute(
                "UPDATE sessions SET title = ?, last_message = ?, last_message_time = ?
                 WHERE user_id = ? AND id = ?",
                params![title, last_message, now, user_id, session_id],
            )
        } else {
            conn.execute(
                "UPDATE sessions SET last_message = ?, last_message_time = ?
                 WHERE user_id = ? AND id = ?",
                params![last_message, now, user_id, session_id],
            )
        }
        .context("Failed to update session summary")
        .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        self.notify_directory(user_id);
        Ok(())
    }

    /// Delete a session and all of its messages
    ///
    /// Child messages go first, then the session record. Idempotent:
    /// deleting a missing session is not an error.
    pub fn delete_session(&self, user_id: &str, session_id: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM messages WHERE user_id = ? AND session_id = ?",
            params![user_id, session_id],
        )
        .context("Failed to delete messages")
        .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        conn.execute(
            "DELETE FROM sessions WHERE user_id = ? AND id = ?",
            params![user_id, session_id],
        )
        .context("Failed to delete session")
        .map_err(|e| AgrichatError::Storage(e.to_string()))?;

        tracing::debug!(user_id, session_id, "deleted session");

        // Close any live message subscription for the deleted session
        // after delivering the final (empty) snapshot.
        if let Ok(mut watchers) = self.message_watchers.lock() {
            if let Some(tx) = watchers.remove(&(user_id.to_string(), session_id.to_string())) {
                let _ = tx.send(Vec::new());
            }
        }
        self.notify_directory(user_id);
        Ok(())
    }

    /// Subscribe to a session's ordered message list
    ///
    /// Taking out a new subscription for the same session replaces any
    /// prior one, closing the older handle.
    pub fn subscribe_messages(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Subscription<Vec<ChatMessage>>> {
        let snapshot = self.messages(user_id, session_id)?;
        let (tx, rx) = watch::channel(snapshot);

        let mut watchers = self
            .message_watchers
            .lock()
            .map_err(|_| AgrichatError::Storage("message watcher registry poisoned".into()))?;
        watchers.insert((user_id.to_string(), session_id.to_string()), tx);

        Ok(Subscription::new(rx))
    }

    /// Subscribe to the user's capped, recency-ordered session directory
    pub fn subscribe_sessions(&self, user_id: &str) -> Result<Subscription<Vec<SessionSummary>>> {
        let snapshot = self.list_sessions(user_id)?;
        let (tx, rx) = watch::channel(snapshot);

        let mut watchers = self
            .directory_watchers
            .lock()
            .map_err(|_| AgrichatError::Storage("directory watcher registry poisoned".into()))?;
        watchers.insert(user_id.to_string(), tx);

        Ok(Subscription::new(rx))
    }

    /// Push a fresh message snapshot to the session's watcher, if any
    fn notify_messages(&self, user_id: &str, session_id: &str) {
        let key = (user_id.to_string(), session_id.to_string());
        let Ok(mut watchers) = self.message_watchers.lock() else {
            return;
        };
        if let Some(tx) = watchers.get(&key) {
            match self.messages(user_id, session_id) {
                Ok(snapshot) => {
                    if tx.send(snapshot).is_err() {
                        watchers.remove(&key);
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id, session_id, error = %e, "failed to build message snapshot");
                }
            }
        }
    }

    /// Push a fresh directory snapshot to the user's watcher, if any
    fn notify_directory(&self, user_id: &str) {
        let Ok(mut watchers) = self.directory_watchers.lock() else {
            return;
        };
        if let Some(tx) = watchers.get(user_id) {
            match self.list_sessions(user_id) {
                Ok(snapshot) => {
                    if tx.send(snapshot).is_err() {
                        watchers.remove(user_id);
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "failed to build directory snapshot");
                }
            }
        }
    }
}

fn to_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            // A fabricated current timestamp would scramble the ascending
            // order of older messages; pin corrupted values to the epoch.
            tracing::warn!(value = s, error = %e, "unparseable stored timestamp");
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionSummary> {
    let last_message_time: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    Ok(SessionSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        last_message: row.get(2)?,
        last_message_time: parse_rfc3339(&last_message_time),
        created_at: parse_rfc3339(&created_at),
    })
}
