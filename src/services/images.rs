use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Destination for uploaded image bytes. `path` is the public path recorded
/// on the document, e.g. `public/images/products/<uuid>.png`.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, path: &str, bytes: Vec<u8>) -> std::io::Result<()>;
}

/// Writes images under the uploads directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    public_dir: PathBuf,
}

impl FsImageStore {
    pub fn new(public_dir: impl Into<PathBuf>) -> Self {
        Self { public_dir: public_dir.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        // Stored paths start with the public prefix; the directory may be elsewhere.
        let relative = path.strip_prefix("public/").unwrap_or(path);
        self.public_dir.join(relative)
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, path: &str, bytes: Vec<u8>) -> std::io::Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await
    }
}

/// Saves an upload in the background. The request does not wait for it and
/// failures are only logged.
pub fn spawn_save(images: Arc<dyn ImageStore>, path: String, bytes: Vec<u8>) {
    tokio::spawn(async move {
        match images.save(&path, bytes).await {
            Ok(()) => tracing::debug!("images: stored {}", path),
            Err(e) => tracing::error!("images: failed to store {}: {}", path, e),
        }
    });
}

/// File extension for an accepted image content type; `None` for anything
/// that is not a raster image format.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        _ => None,
    }
}

/// Public path for a new upload in `folder`.
pub fn upload_path(folder: &str, extension: &str) -> String {
    format!("public/images/{}/{}.{}", folder, uuid::Uuid::new_v4(), extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_paths_live_under_the_folder() {
        let path = upload_path("products", "png");
        assert!(path.starts_with("public/images/products/"));
        assert!(path.ends_with(".png"));
    }

    #[test]
    fn extensions_follow_the_content_type() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("IMAGE/PNG; charset=binary"), Some("png"));
        assert_eq!(extension_for("image/webp"), Some("webp"));
        assert_eq!(extension_for("image/svg+xml"), None);
        assert_eq!(extension_for("text/plain"), None);
    }

    #[tokio::test]
    async fn fs_store_writes_relative_to_public_dir() {
        let dir = std::env::temp_dir().join(format!("shopfront-images-{}", uuid::Uuid::new_v4()));
        let store = FsImageStore::new(&dir);
        store.save("public/images/users/a.jpg", vec![1, 2, 3]).await.unwrap();

        let written = tokio::fs::read(dir.join("images/users/a.jpg")).await.unwrap();
        assert_eq!(written, vec![1, 2, 3]);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
