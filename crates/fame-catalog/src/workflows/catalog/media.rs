use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::PhotoRef;

/// Image payload as forwarded by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUpload {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Downloaded image bytes. The transport fetches the file before forwarding the event;
    /// a store that writes avatars to disk refuses uploads without them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<u8>>,
}

impl ImageUpload {
    /// True when the declared MIME type is `image/*`.
    pub fn is_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .and_then(|raw| raw.parse::<mime::Mime>().ok())
            .is_some_and(|parsed| parsed.type_() == mime::IMAGE)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media store rejected upload {file_id}: {reason}")]
    Rejected { file_id: String, reason: String },
    #[error("media store unavailable: {0}")]
    Unavailable(String),
}

/// Persists avatar images and hands back a stable reference.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store(&self, upload: &ImageUpload) -> Result<PhotoRef, MediaError>;
}
