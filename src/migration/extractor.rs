//! # Attachment Extractor
//!
//! Moves one record's embedded payload into the blob store: the raw bytes
//! always, plus a thumbnail when the content type is an image. Every key is
//! recorded in the caller's ledger as soon as it exists.

use super::ledger::BlobLedger;
use crate::models::SourceLogRecord;
use crate::storage::path::{join, storage_file_name, thumbnail_path};
use crate::storage::{BlobStore, BlobStoreError, FilePathGenerator};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Keys produced for one attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub file_id: String,
    pub thumbnail_id: Option<String>,
}

#[derive(Clone)]
pub struct AttachmentExtractor {
    blob_store: Arc<dyn BlobStore>,
    path_generator: Arc<dyn FilePathGenerator>,
}

impl std::fmt::Debug for AttachmentExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentExtractor").finish_non_exhaustive()
    }
}

impl AttachmentExtractor {
    pub fn new(blob_store: Arc<dyn BlobStore>, path_generator: Arc<dyn FilePathGenerator>) -> Self {
        Self {
            blob_store,
            path_generator,
        }
    }

    /// Store the attachment of `record`, naming the file after `log_id`.
    pub async fn extract(
        &self,
        record: &SourceLogRecord,
        log_id: i64,
        ledger: &mut BlobLedger,
    ) -> Result<StoredAttachment, ExtractionError> {
        let attachment = record
            .attachment
            .as_ref()
            .ok_or_else(|| ExtractionError::missing_payload(&record.id))?;

        let data = attachment
            .payload
            .read_all()
            .await
            .map_err(|source| ExtractionError::PayloadRead {
                record_id: record.id.clone(),
                source,
            })?;

        let common_path =
            self.path_generator
                .generate(record.log_time, record.project_id, record.launch_id);
        let file_name = storage_file_name(log_id, &attachment.filename);

        let file_id = self
            .blob_store
            .save(&join(&common_path, &file_name), &data)
            .await
            .map_err(|source| ExtractionError::BlobStore {
                record_id: record.id.clone(),
                source,
            })?;
        ledger.record(file_id.clone());

        let thumbnail_id = if attachment.is_image() {
            let path = thumbnail_path(&common_path, &file_name);
            match self.blob_store.save_thumbnail(&path, &data).await {
                Ok(key) => {
                    ledger.record(key.clone());
                    Some(key)
                }
                Err(e) => {
                    warn!(
                        record_id = %record.id,
                        path = %path,
                        error = %e,
                        "Thumbnail not stored, keeping attachment without one"
                    );
                    None
                }
            }
        } else {
            None
        };

        debug!(
            record_id = %record.id,
            log_id = log_id,
            size = data.len(),
            has_thumbnail = thumbnail_id.is_some(),
            "Extracted attachment"
        );

        Ok(StoredAttachment {
            file_id,
            thumbnail_id,
        })
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Record {record_id} has no attachment payload")]
    MissingPayload { record_id: String },

    #[error("Failed to read attachment payload of record {record_id}: {source}")]
    PayloadRead {
        record_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to store attachment of record {record_id}: {source}")]
    BlobStore {
        record_id: String,
        #[source]
        source: BlobStoreError,
    },
}

impl ExtractionError {
    pub fn missing_payload(record_id: impl Into<String>) -> Self {
        Self::MissingPayload {
            record_id: record_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmbeddedAttachment;
    use crate::storage::DefaultFilePathGenerator;
    use crate::test_helpers::{png_bytes, record_at, MemoryBlobStore};

    fn extractor(store: &Arc<MemoryBlobStore>) -> AttachmentExtractor {
        AttachmentExtractor::new(store.clone(), Arc::new(DefaultFilePathGenerator))
    }

    #[tokio::test]
    async fn test_non_image_gets_no_thumbnail() {
        let store = Arc::new(MemoryBlobStore::new());
        let record = record_at("r-1", 7, 99).with_attachment(EmbeddedAttachment::inline(
            "trace.txt",
            "text/plain",
            b"stack".to_vec(),
        ));
        let mut ledger = BlobLedger::new();

        let stored = extractor(&store).extract(&record, 1001, &mut ledger).await.unwrap();

        assert!(stored.thumbnail_id.is_none());
        assert_eq!(ledger.keys(), &[stored.file_id.clone()]);
        assert_eq!(store.saved_paths(), vec!["7/2019-03/99/1001-trace.txt".to_string()]);
        assert_eq!(store.thumbnail_calls(), 0);
    }

    #[tokio::test]
    async fn test_image_gets_thumbnail_next_to_file() {
        let store = Arc::new(MemoryBlobStore::new());
        let record = record_at("r-2", 7, 99).with_attachment(EmbeddedAttachment::inline(
            "screen.png",
            "image/png",
            png_bytes(),
        ));
        let mut ledger = BlobLedger::new();

        let stored = extractor(&store).extract(&record, 5, &mut ledger).await.unwrap();

        assert!(stored.thumbnail_id.is_some());
        assert_eq!(ledger.len(), 2);
        assert_eq!(
            store.saved_paths(),
            vec![
                "7/2019-03/99/5-screen.png".to_string(),
                "7/2019-03/99/thumbnail-5-screen.png".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_thumbnail_failure_is_not_fatal() {
        let store = Arc::new(MemoryBlobStore::new());
        store.fail_thumbnails(true);
        let record = record_at("r-3", 1, 2).with_attachment(EmbeddedAttachment::inline(
            "screen.jpg",
            "IMAGE/JPEG",
            b"not really a jpeg".to_vec(),
        ));
        let mut ledger = BlobLedger::new();

        let stored = extractor(&store).extract(&record, 9, &mut ledger).await.unwrap();

        assert!(stored.thumbnail_id.is_none());
        assert_eq!(ledger.len(), 1);
        assert_eq!(store.thumbnail_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_payload_is_an_error() {
        let store = Arc::new(MemoryBlobStore::new());
        let mut ledger = BlobLedger::new();
        let err = extractor(&store)
            .extract(&record_at("r-4", 1, 2), 1, &mut ledger)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::MissingPayload { .. }));
        assert_eq!(store.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_ledger_empty() {
        let store = Arc::new(MemoryBlobStore::new());
        store.fail_saves(true);
        let record = record_at("r-5", 1, 2).with_attachment(EmbeddedAttachment::inline(
            "a.bin",
            "application/octet-stream",
            vec![0u8; 4],
        ));
        let mut ledger = BlobLedger::new();

        let err = extractor(&store).extract(&record, 1, &mut ledger).await.unwrap_err();
        assert!(matches!(err, ExtractionError::BlobStore { .. }));
        assert!(ledger.is_empty());
    }
}
