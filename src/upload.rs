//! Attachment uploads to object storage
//!
//! Moves a locally-selected image into durable object storage and returns
//! the stable public URL used both for display and as model input. No
//! internal retry: the caller keeps the pending image on failure so the
//! user can resubmit.

use crate::config::UploadConfig;
use crate::error::{AgrichatError, Result};
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Fixed user-facing message for upload failures; the raw cause is only
/// logged
const UPLOAD_FAILED_MESSAGE: &str =
    "Image upload failed. Please check your connection and try again.";

/// Uploads attachments and mints durable URLs
pub struct AttachmentUploader {
    client: Client,
    endpoint: String,
    public_base: String,
    last_key_millis: AtomicI64,
}

impl AttachmentUploader {
    /// Create a new uploader
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("agrichat/0.1.0")
            .build()
            .map_err(|e| AgrichatError::Upload(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            public_base: config.public_base_url.trim_end_matches('/').to_string(),
            last_key_millis: AtomicI64::new(0),
        })
    }

    /// Upload an image and return its durable public URL
    ///
    /// The key embeds the user id and a monotonically increasing epoch
    /// millisecond value, so two uploads from one user never collide even
    /// within the same millisecond.
    ///
    /// # Errors
    ///
    /// Returns `AgrichatError::Upload` with a fixed user-facing message;
    /// the underlying cause is logged, never shown raw
    pub async fn upload(&self, user_id: &str, data: Bytes) -> Result<String> {
        let key = self.next_key(user_id);
        let url = format!("{}/{}", self.endpoint, key);

        tracing::debug!(user_id, key = %key, size = data.len(), "uploading attachment");

        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "image/jpeg")
            .header("x-amz-acl", "public-read")
            .body(data)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(user_id, "attachment upload failed: {}", e);
                AgrichatError::Upload(UPLOAD_FAILED_MESSAGE.to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                user_id,
                status = %response.status(),
                "attachment upload rejected"
            );
            return Err(AgrichatError::Upload(UPLOAD_FAILED_MESSAGE.to_string()).into());
        }

        Ok(format!("{}/{}", self.public_base, key))
    }

    /// Build the next storage key for a user
    ///
    /// `fetch_update` yields the counter value before the update, so the
    /// stored value is recomputed here to get the key that was actually
    /// reserved.
    fn next_key(&self, user_id: &str) -> String {
        let now = Utc::now().timestamp_millis();
        let prev = self
            .last_key_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now.max(prev + 1))
            })
            .unwrap_or(0);
        let millis = now.max(prev + 1);
        format!("{}-{}.jpg", user_id, millis)
    }
}
