use async_trait::async_trait;
use fame_catalog::workflows::catalog::{
    DeliveryError, ImageUpload, MediaError, MediaStore, Notice, Notifier, PhotoRef, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Writes avatars under a local directory, one file per upload.
/// Uploads must carry the downloaded bytes; a bare file id is refused.
#[derive(Debug, Clone)]
pub(crate) struct LocalAvatarStore {
    dir: PathBuf,
}

impl LocalAvatarStore {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// Extension for the declared MIME type, `jpg` when unknown.
pub(crate) fn avatar_extension(mime_type: Option<&str>) -> &'static str {
    mime_type
        .and_then(mime_guess::get_mime_extensions_str)
        .and_then(|extensions| {
            extensions
                .iter()
                .find(|ext| **ext == "jpg")
                .or_else(|| extensions.first())
                .copied()
        })
        .unwrap_or("jpg")
}

fn file_stem(file_id: &str) -> String {
    file_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl MediaStore for LocalAvatarStore {
    async fn store(&self, upload: &ImageUpload) -> Result<PhotoRef, MediaError> {
        let Some(bytes) = upload.bytes.as_deref() else {
            return Err(MediaError::Rejected {
                file_id: upload.file_id.clone(),
                reason: "upload carries no image bytes".to_string(),
            });
        };
        if upload.file_id.is_empty() {
            return Err(MediaError::Rejected {
                file_id: String::new(),
                reason: "missing file id".to_string(),
            });
        }

        let name = format!(
            "{}.{}",
            file_stem(&upload.file_id),
            avatar_extension(upload.mime_type.as_deref())
        );
        let path = self.dir.join(name);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| MediaError::Unavailable(err.to_string()))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|err| MediaError::Unavailable(err.to_string()))?;

        debug!(path = %path.display(), size = bytes.len(), "avatar stored");
        Ok(PhotoRef(path.to_string_lossy().into_owned()))
    }
}

/// Records notices in the service log; the transport picks them up from there.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn deliver(&self, recipient: UserId, notice: Notice) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(&notice)
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        info!(%recipient, application_id = %notice.application_id(), %payload, "notice queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("fame-avatars-{}-{nanos}", std::process::id()))
    }

    #[test]
    fn extension_prefers_jpg_and_falls_back() {
        assert_eq!(avatar_extension(Some("image/jpeg")), "jpg");
        assert_eq!(avatar_extension(Some("image/png")), "png");
        assert_eq!(avatar_extension(Some("not/a-type")), "jpg");
        assert_eq!(avatar_extension(None), "jpg");
    }

    #[tokio::test]
    async fn stores_bytes_under_sanitized_name() {
        let dir = scratch_dir();
        let store = LocalAvatarStore::new(&dir);
        let upload = ImageUpload {
            file_id: "AgAC/x:1".to_string(),
            mime_type: Some("image/png".to_string()),
            bytes: Some(vec![1, 2, 3]),
        };

        let photo = store.store(&upload).await.expect("stored");

        let expected = dir.join("AgAC_x_1.png");
        assert_eq!(photo.0, expected.to_string_lossy());
        assert_eq!(tokio::fs::read(&expected).await.expect("file"), vec![1, 2, 3]);
        tokio::fs::remove_dir_all(&dir).await.expect("cleanup");
    }

    #[tokio::test]
    async fn refuses_uploads_without_bytes() {
        let store = LocalAvatarStore::new(scratch_dir());
        let upload = ImageUpload {
            file_id: "abc".to_string(),
            mime_type: Some("image/jpeg".to_string()),
            bytes: None,
        };
        assert!(matches!(
            store.store(&upload).await,
            Err(MediaError::Rejected { .. })
        ));
    }
}
