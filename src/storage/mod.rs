//! # Blob Storage
//!
//! External byte store for attachment content. Writes take effect immediately and
//! are not part of any database transaction; callers that need to undo them do so
//! explicitly through [`BlobStore::delete`].
//!
//! ## Key Components
//!
//! - [`BlobStore`] - save / save thumbnail / delete contract
//! - [`encoder`] - Reversible mapping between storage paths and opaque keys
//! - [`path`] - Hierarchical placement of attachment files
//! - [`thumbnail`] - Thumbnail rendering for image content
//! - [`filesystem`] - Local filesystem implementation

pub mod encoder;
pub mod filesystem;
pub mod path;
pub mod thumbnail;

pub use encoder::{Base64DataEncoder, DataEncoder};
pub use filesystem::FilesystemBlobStore;
pub use path::{storage_file_name, thumbnail_path, DefaultFilePathGenerator, FilePathGenerator};
pub use thumbnail::ThumbnailRenderer;

use async_trait::async_trait;
use thiserror::Error;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `path` and return the key that addresses it.
    async fn save(&self, path: &str, data: &[u8]) -> Result<String, BlobStoreError>;

    /// Store a thumbnail variant derived from the image in `data`.
    async fn save_thumbnail(&self, path: &str, data: &[u8]) -> Result<String, BlobStoreError>;

    /// Remove the blob behind `key`. Deleting a missing blob is not an error.
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;
}

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid storage path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid blob key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Thumbnail generation failed for {path}: {reason}")]
    Thumbnail { path: String, reason: String },

    #[error("Blob store unavailable: {message}")]
    Unavailable { message: String },
}

impl BlobStoreError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn thumbnail(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Thumbnail {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
