//! agrichat - embeddable AI advisory chat
//!
//! Persistent, multi-session chat between a farmer and a generative
//! assistant: durable per-user message storage with live snapshots, a
//! recency-ordered session directory, bounded prompt composition, image
//! attachments via object storage, and a generative adapter layer with a
//! proxied-to-direct fallback chain.
//!
//! # Example
//!
//! ```no_run
//! use agrichat::config::Config;
//! use agrichat::controller::SessionController;
//! use agrichat::providers::create_generator;
//! use agrichat::store::ChatStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> agrichat::error::Result<()> {
//! let config = Config::load("config.yaml")?;
//! let store = Arc::new(ChatStore::new(&config.chat)?);
//! let generator = create_generator(&config.generator)?;
//! let controller = SessionController::new(store, generator, None, &config.chat);
//!
//! let session = controller.start_new_chat("farmer-1").await?;
//! let outcome = controller
//!     .send_user_turn("farmer-1", &session.id, "How do I treat leaf rust?", None)
//!     .await?;
//! println!("{}", outcome.bot_message.text);
//! # Ok(())
//! # }
//! ```

pub mod composer;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod providers;
pub mod store;
pub mod upload;

pub use config::Config;
pub use controller::{PendingImage, SessionController, TurnOutcome};
pub use error::{AgrichatError, ErrorKind, Result};
pub use store::{ChatMessage, ChatStore, SessionSummary};
