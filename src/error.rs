//! Error types for agrichat
//!
//! This module defines all error types used throughout the chat subsystem,
//! using `thiserror` for ergonomic error handling, plus the structured
//! `ErrorKind` classification used for fallback and retry routing.

use thiserror::Error;

/// Main error type for agrichat operations
///
/// This enum encompasses all failure classes of the chat subsystem:
/// transport failures against the generative endpoint, object-storage
/// upload failures, authentication failures against the proxied callable,
/// and persistence failures against the message store.
///
/// A model that declines to answer is NOT an error: providers return a
/// stand-in string for that case (see `providers::REFUSAL_FALLBACK`).
#[derive(Error, Debug)]
pub enum AgrichatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network unreachable, non-2xx status, or malformed response body
    #[error("Transport error: {0}")]
    Transport(String),

    /// The proxied callable failed specifically on image analysis
    #[error("Image analysis failed: {0}")]
    ImageAnalysis(String),

    /// Object-storage upload failure, translated for the user
    #[error("Upload error: {0}")]
    Upload(String),

    /// Caller not authenticated when invoking the proxied callable
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Message store read/write failure (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A second send was attempted while a turn was already in flight
    #[error("A turn is already in flight for session {0}")]
    TurnInFlight(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Coarse error classification
///
/// The fallback chain and the turn-failure reporting route on this kind
/// instead of inspecting error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport-level failure (network, status, malformed body)
    Transport,
    /// Image-specific failure from the proxied callable
    ImageAnalysis,
    /// Upload failure against object storage
    Upload,
    /// Authentication failure
    Auth,
    /// Persistence failure
    Storage,
    /// Configuration failure
    Config,
    /// Turn rejected because one is already in flight
    TurnInFlight,
    /// Anything not produced by this crate
    Other,
}

impl AgrichatError {
    /// Classify this error for routing decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Transport(_) | Self::Http(_) => ErrorKind::Transport,
            Self::ImageAnalysis(_) => ErrorKind::ImageAnalysis,
            Self::Upload(_) => ErrorKind::Upload,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Storage(_) => ErrorKind::Storage,
            Self::TurnInFlight(_) => ErrorKind::TurnInFlight,
            Self::Io(_) | Self::Serialization(_) | Self::Yaml(_) => ErrorKind::Other,
        }
    }
}

/// Classify an `anyhow::Error` by downcasting to [`AgrichatError`]
///
/// Errors raised outside this crate classify as [`ErrorKind::Other`].
///
/// # Examples
///
/// ```
/// use agrichat::error::{classify, AgrichatError, ErrorKind};
///
/// let err: anyhow::Error = AgrichatError::Auth("no identity".into()).into();
/// assert_eq!(classify(&err), ErrorKind::Auth);
/// ```
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    err.downcast_ref::<AgrichatError>()
        .map(AgrichatError::kind)
        .unwrap_or(ErrorKind::Other)
}

/// Result type alias for agrichat operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
