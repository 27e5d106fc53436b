//! Filesystem blob store.
//!
//! Blobs live under a root directory at their storage path; the returned key is
//! the path run through a [`DataEncoder`]. Writes go to a temporary sibling file
//! first and are renamed into place, so a reader never sees a partial blob.

use super::encoder::{Base64DataEncoder, DataEncoder};
use super::thumbnail::ThumbnailRenderer;
use super::{BlobStore, BlobStoreError};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct FilesystemBlobStore {
    root: PathBuf,
    encoder: Arc<dyn DataEncoder>,
    renderer: ThumbnailRenderer,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            encoder: Arc::new(Base64DataEncoder),
            renderer: ThumbnailRenderer::default(),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn DataEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_thumbnail_renderer(mut self, renderer: ThumbnailRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a storage path, rejecting anything that would escape the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, BlobStoreError> {
        let relative = Path::new(path);
        if path.is_empty() {
            return Err(BlobStoreError::invalid_path(path, "empty path"));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(BlobStoreError::invalid_path(
                        path,
                        "must be relative and stay inside the store root",
                    ))
                }
            }
        }
        Ok(self.root.join(relative))
    }

    /// Absolute location of the blob behind a key
    pub fn locate(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        let path = self.encoder.decode(key)?;
        self.resolve(&path)
    }

    async fn write_atomically(&self, path: &str, data: &[u8]) -> Result<(), BlobStoreError> {
        let full_path = self.resolve(path)?;
        debug!(storage_path = %path, size = data.len(), "blob_store: write");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobStoreError::io(parent.display().to_string(), e))?;
        }

        let temp_path = full_path.with_file_name(format!(
            ".{}.{}.tmp",
            full_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Uuid::new_v4().simple()
        ));

        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &full_path).await
        }
        .await;

        if let Err(e) = result {
            warn!(temp_path = %temp_path.display(), error = %e, "blob_store: write failed");
            let _ = fs::remove_file(&temp_path).await;
            return Err(BlobStoreError::io(full_path.display().to_string(), e));
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn save(&self, path: &str, data: &[u8]) -> Result<String, BlobStoreError> {
        self.write_atomically(path, data).await?;
        Ok(self.encoder.encode(path))
    }

    async fn save_thumbnail(&self, path: &str, data: &[u8]) -> Result<String, BlobStoreError> {
        let renderer = self.renderer;
        let source = data.to_vec();
        let thumbnail = tokio::task::spawn_blocking(move || renderer.render(&source))
            .await
            .map_err(|e| BlobStoreError::thumbnail(path, e.to_string()))?
            .map_err(|e| BlobStoreError::thumbnail(path, e.to_string()))?;

        self.save(path, &thumbnail).await
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        let full_path = self.locate(key)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => {
                debug!(path = %full_path.display(), "blob_store: deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobStoreError::io(full_path.display().to_string(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_escaping_paths() {
        let store = FilesystemBlobStore::new("/srv/blobs");
        assert!(store.resolve("../secret").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("a/../../b").is_err());
        assert!(store.resolve("").is_err());
        assert_eq!(
            store.resolve("7/2019-03/99/1-a.txt").unwrap(),
            PathBuf::from("/srv/blobs/7/2019-03/99/1-a.txt")
        );
    }

    #[tokio::test]
    async fn test_save_then_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path());

        let key = store.save("1/2019-03/2/10-a.txt", b"payload").await.unwrap();
        let on_disk = store.locate(&key).unwrap();
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"payload");

        store.delete(&key).await.unwrap();
        assert!(!on_disk.exists());

        // deleting again is not an error
        store.delete(&key).await.unwrap();
    }
}
