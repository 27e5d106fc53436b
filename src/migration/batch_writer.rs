//! # Log Batch Writer
//!
//! Writes one batch of source records as log rows plus attachment rows.
//!
//! ## Attempt lifecycle
//!
//! ```text
//! Start -> Allocating -> Extracting -> Inserting -> Committed
//!                                         |
//!                                         +-> Compensating -> Start (retry)
//! ```
//!
//! Each attempt allocates fresh id ranges, stores attachment blobs (recording
//! every key in a per-attempt [`BlobLedger`]) and hands both row sets to the
//! [`RelationalSink`] in one transaction. Blob writes are not transactional:
//! whenever an attempt does not commit, the ledger is cleaned up before the
//! writer retries or returns.
//!
//! An integrity violation from the sink triggers compensation, NUL stripping of
//! every message, and a retry, up to `max_integrity_retries` times. Every other
//! failure is returned after cleanup.

use super::extractor::{AttachmentExtractor, ExtractionError};
use super::ledger::{delete_keys, BlobLedger};
use crate::config::BatchConfig;
use crate::database::sequence::{SequenceAllocator, SequenceError, SequenceSource};
use crate::database::sink::{RelationalSink, SinkError};
use crate::logging::{log_batch_operation, log_error};
use crate::models::{NewAttachment, SourceLogRecord};
use crate::storage::{BlobStore, BlobStoreError, FilePathGenerator};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Counters for one written batch, or the sum over several
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchWriteOutcome {
    pub batches: usize,
    /// Attempts made, including the committed one
    pub attempts: u32,
    pub logs_inserted: u64,
    pub attachments_inserted: u64,
    pub blobs_written: usize,
    /// Blobs deleted again, either after a failed attempt or because their
    /// attachment row was skipped as already present
    pub blobs_compensated: usize,
    pub messages_sanitized: usize,
}

impl BatchWriteOutcome {
    fn absorb(&mut self, other: BatchWriteOutcome) {
        self.batches += other.batches;
        self.attempts += other.attempts;
        self.logs_inserted += other.logs_inserted;
        self.attachments_inserted += other.attachments_inserted;
        self.blobs_written += other.blobs_written;
        self.blobs_compensated += other.blobs_compensated;
        self.messages_sanitized += other.messages_sanitized;
    }
}

/// Writes batches of [`SourceLogRecord`]s. Holds no per-batch state, so one
/// writer can be shared across tasks.
#[derive(Clone)]
pub struct LogBatchWriter {
    log_ids: SequenceAllocator,
    attachment_ids: SequenceAllocator,
    extractor: AttachmentExtractor,
    blob_store: Arc<dyn BlobStore>,
    sink: Arc<dyn RelationalSink>,
    batch_size: usize,
    max_integrity_retries: u32,
}

impl std::fmt::Debug for LogBatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBatchWriter")
            .field("log_ids", &self.log_ids)
            .field("attachment_ids", &self.attachment_ids)
            .field("batch_size", &self.batch_size)
            .field("max_integrity_retries", &self.max_integrity_retries)
            .finish_non_exhaustive()
    }
}

impl LogBatchWriter {
    pub fn new(
        sequence_source: Arc<dyn SequenceSource>,
        blob_store: Arc<dyn BlobStore>,
        path_generator: Arc<dyn FilePathGenerator>,
        sink: Arc<dyn RelationalSink>,
        config: &BatchConfig,
    ) -> Self {
        Self {
            log_ids: SequenceAllocator::new(sequence_source.clone(), &config.log_sequence),
            attachment_ids: SequenceAllocator::new(sequence_source, &config.attachment_sequence),
            extractor: AttachmentExtractor::new(blob_store.clone(), path_generator),
            blob_store,
            sink,
            batch_size: config.batch_size.max(1),
            max_integrity_retries: config.max_integrity_retries,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_integrity_retries(&self) -> u32 {
        self.max_integrity_retries
    }

    /// Write one batch. An empty batch is a no-op.
    #[instrument(skip_all, fields(batch_size = records.len()))]
    pub async fn write_batch(
        &self,
        mut records: Vec<SourceLogRecord>,
    ) -> Result<BatchWriteOutcome, BatchWriteError> {
        let mut outcome = BatchWriteOutcome::default();
        if records.is_empty() {
            return Ok(outcome);
        }

        outcome.batches = 1;
        loop {
            outcome.attempts += 1;
            let attempt = outcome.attempts;
            log_batch_operation("write_batch", records.len(), attempt, "started", None);

            let mut ledger = BlobLedger::new();
            let result = self.run_attempt(&records, &mut ledger).await;
            outcome.blobs_written += ledger.len();

            match result {
                Ok(committed) => {
                    outcome.logs_inserted += committed.logs_inserted;
                    outcome.attachments_inserted += committed.attachments_inserted;

                    if !committed.skipped_blob_keys.is_empty() {
                        let report = delete_keys(
                            self.blob_store.as_ref(),
                            committed.skipped_blob_keys.iter().map(String::as_str),
                        )
                        .await;
                        outcome.blobs_compensated += report.deleted;
                    }

                    log_batch_operation(
                        "write_batch",
                        records.len(),
                        attempt,
                        "committed",
                        None,
                    );
                    info!(
                        attempts = attempt,
                        logs_inserted = outcome.logs_inserted,
                        attachments_inserted = outcome.attachments_inserted,
                        "Batch committed"
                    );
                    return Ok(outcome);
                }
                Err(AttemptFailure::Integrity(violation)) => {
                    let report = ledger.compensate(self.blob_store.as_ref()).await;
                    outcome.blobs_compensated += report.deleted;

                    if attempt > self.max_integrity_retries {
                        log_error(
                            "LogBatchWriter",
                            "write_batch",
                            &violation.to_string(),
                            Some("integrity retries exhausted"),
                        );
                        return Err(BatchWriteError::RetriesExhausted {
                            attempts: attempt,
                            last_error: violation,
                        });
                    }

                    let sanitized = records
                        .iter_mut()
                        .map(SourceLogRecord::sanitize_message)
                        .filter(|changed| *changed)
                        .count();
                    outcome.messages_sanitized += sanitized;

                    warn!(
                        attempt = attempt,
                        error = %violation,
                        blobs_deleted = report.deleted,
                        blobs_left = report.failed,
                        messages_sanitized = sanitized,
                        "Integrity violation, compensated and retrying batch"
                    );
                    log_batch_operation(
                        "write_batch",
                        records.len(),
                        attempt,
                        "compensated",
                        Some(&violation.to_string()),
                    );
                }
                Err(AttemptFailure::Fatal(error)) => {
                    let report = ledger.compensate(self.blob_store.as_ref()).await;
                    log_error(
                        "LogBatchWriter",
                        "write_batch",
                        &error.to_string(),
                        Some(&format!(
                            "attempt {attempt}, {} blobs cleaned up",
                            report.deleted
                        )),
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Split `records` into batches of the configured size and write them in order.
    ///
    /// Stops at the first failing batch; earlier batches stay committed.
    pub async fn write_in_batches(
        &self,
        records: Vec<SourceLogRecord>,
    ) -> Result<BatchWriteOutcome, BatchWriteError> {
        let mut total = BatchWriteOutcome::default();
        let mut remaining = records.into_iter().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<_> = remaining.by_ref().take(self.batch_size).collect();
            total.absorb(self.write_batch(batch).await?);
        }
        Ok(total)
    }

    async fn run_attempt(
        &self,
        records: &[SourceLogRecord],
        ledger: &mut BlobLedger,
    ) -> Result<CommittedAttempt, AttemptFailure> {
        // Only the first record per uuid can own a log row, later ones are
        // skipped by the sink and must not leave attachment rows or blobs behind.
        let mut seen = HashSet::with_capacity(records.len());
        let owns_row: Vec<bool> = records.iter().map(|r| seen.insert(r.id.as_str())).collect();

        let attachment_count = records
            .iter()
            .zip(&owns_row)
            .filter(|(r, owns)| **owns && r.has_attachment())
            .count();
        let attachment_ids = self.attachment_ids.allocate(attachment_count).await?;
        let log_ids = self.log_ids.allocate(records.len()).await?;

        let mut next_attachment_id = attachment_ids.iter();
        let mut attachments: Vec<NewAttachment> = Vec::with_capacity(attachment_count);
        let mut logs = Vec::with_capacity(records.len());

        for ((record, log_id), owns) in records.iter().zip(log_ids.iter()).zip(owns_row) {
            let attachment_id = match &record.attachment {
                Some(embedded) if owns => {
                    let stored = self
                        .extractor
                        .extract(record, log_id, ledger)
                        .await
                        .map_err(BatchWriteError::from)?;
                    let id = next_attachment_id.next().ok_or_else(|| {
                        BatchWriteError::IdRangeExhausted {
                            sequence: self.attachment_ids.sequence_name().to_string(),
                        }
                    })?;
                    attachments.push(NewAttachment {
                        id,
                        file_id: stored.file_id,
                        thumbnail_id: stored.thumbnail_id,
                        content_type: embedded.content_type.clone(),
                        project_id: record.project_id,
                        launch_id: record.launch_id,
                        item_id: record.item_id,
                        owner_uuid: record.id.clone(),
                    });
                    Some(id)
                }
                Some(_) => {
                    debug!(record_id = %record.id, "Duplicate uuid in batch, attachment skipped");
                    None
                }
                None => None,
            };
            logs.push(record.to_log_row(log_id, attachment_id));
        }

        let summary = self
            .sink
            .insert_batch(&attachments, &logs)
            .await
            .map_err(|e| {
                if e.is_integrity_violation() {
                    AttemptFailure::Integrity(e)
                } else {
                    AttemptFailure::Fatal(BatchWriteError::DatabaseFailure(e))
                }
            })?;

        let skipped_blob_keys = attachments
            .iter()
            .filter(|a| summary.skipped_attachment_ids.contains(&a.id))
            .flat_map(|a| a.blob_keys().map(str::to_string))
            .collect();

        Ok(CommittedAttempt {
            logs_inserted: summary.logs_inserted,
            attachments_inserted: summary.attachments_inserted,
            skipped_blob_keys,
        })
    }
}

struct CommittedAttempt {
    logs_inserted: u64,
    attachments_inserted: u64,
    skipped_blob_keys: Vec<String>,
}

enum AttemptFailure {
    Integrity(SinkError),
    Fatal(BatchWriteError),
}

impl From<BatchWriteError> for AttemptFailure {
    fn from(error: BatchWriteError) -> Self {
        Self::Fatal(error)
    }
}

impl From<SequenceError> for AttemptFailure {
    fn from(error: SequenceError) -> Self {
        Self::Fatal(BatchWriteError::AllocationFailure(error))
    }
}

#[derive(Debug, Error)]
pub enum BatchWriteError {
    #[error("Id allocation failed: {0}")]
    AllocationFailure(#[from] SequenceError),

    #[error("Attachment payload of record {record_id} could not be read: {source}")]
    AttachmentReadFailure {
        record_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Attachment of record {record_id} could not be stored: {source}")]
    BlobStoreFailure {
        record_id: String,
        #[source]
        source: BlobStoreError,
    },

    #[error("Batch insert failed: {0}")]
    DatabaseFailure(SinkError),

    #[error("Batch still violates integrity constraints after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: SinkError },

    #[error("Allocated range from {sequence} ran out of ids")]
    IdRangeExhausted { sequence: String },
}

impl BatchWriteError {
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}

impl From<ExtractionError> for BatchWriteError {
    fn from(error: ExtractionError) -> Self {
        match error {
            ExtractionError::MissingPayload { record_id } => Self::AttachmentReadFailure {
                record_id,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "record carries no attachment payload",
                ),
            },
            ExtractionError::PayloadRead { record_id, source } => {
                Self::AttachmentReadFailure { record_id, source }
            }
            ExtractionError::BlobStore { record_id, source } => {
                Self::BlobStoreFailure { record_id, source }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::AtomicSequenceSource;
    use crate::storage::DefaultFilePathGenerator;
    use crate::test_helpers::{record_at, MemoryBlobStore, MemoryRelationalSink};

    fn writer(sink: Arc<MemoryRelationalSink>, batch_size: usize) -> LogBatchWriter {
        let config = BatchConfig {
            batch_size,
            ..BatchConfig::default()
        };
        LogBatchWriter::new(
            Arc::new(AtomicSequenceSource::default()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(DefaultFilePathGenerator),
            sink,
            &config,
        )
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let sink = Arc::new(MemoryRelationalSink::new());
        let outcome = writer(sink.clone(), 10).write_batch(Vec::new()).await.unwrap();
        assert_eq!(outcome, BatchWriteOutcome::default());
        assert_eq!(sink.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_write_in_batches_splits_by_batch_size() {
        let sink = Arc::new(MemoryRelationalSink::new());
        let records = (0..7)
            .map(|i| record_at(&format!("r-{i}"), 1, 1))
            .collect::<Vec<_>>();

        let outcome = writer(sink.clone(), 3).write_in_batches(records).await.unwrap();

        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.logs_inserted, 7);
        assert_eq!(sink.insert_calls(), 3);
    }

    #[test]
    fn test_extraction_errors_map_to_batch_errors() {
        let read = BatchWriteError::from(ExtractionError::PayloadRead {
            record_id: "r".into(),
            source: std::io::Error::other("gone"),
        });
        assert!(matches!(read, BatchWriteError::AttachmentReadFailure { .. }));

        let store = BatchWriteError::from(ExtractionError::BlobStore {
            record_id: "r".into(),
            source: BlobStoreError::unavailable("down"),
        });
        assert!(matches!(store, BatchWriteError::BlobStoreFailure { .. }));
    }
}
