#![allow(dead_code)]

pub mod strategies;

use log_migration::config::BatchConfig;
use log_migration::constants::sequences::{ATTACHMENT_ID_SEQ, LOG_ID_SEQ};
use log_migration::migration::LogBatchWriter;
use log_migration::storage::DefaultFilePathGenerator;
use log_migration::test_helpers::{MemoryBlobStore, MemoryRelationalSink, RecordingSequenceSource};
use std::sync::Arc;

/// Batch writer over in-memory collaborators, with handles to inspect each one
pub struct WriterHarness {
    pub writer: Arc<LogBatchWriter>,
    pub sequences: Arc<RecordingSequenceSource>,
    pub blobs: Arc<MemoryBlobStore>,
    pub sink: Arc<MemoryRelationalSink>,
}

impl WriterHarness {
    pub fn new() -> Self {
        Self::with_config(BatchConfig::default())
    }

    pub fn with_retries(max_integrity_retries: u32) -> Self {
        Self::with_config(BatchConfig {
            max_integrity_retries,
            ..BatchConfig::default()
        })
    }

    pub fn with_config(config: BatchConfig) -> Self {
        let sequences = Arc::new(RecordingSequenceSource::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let sink = Arc::new(MemoryRelationalSink::new());
        let writer = Arc::new(LogBatchWriter::new(
            sequences.clone(),
            blobs.clone(),
            Arc::new(DefaultFilePathGenerator),
            sink.clone(),
            &config,
        ));
        Self {
            writer,
            sequences,
            blobs,
            sink,
        }
    }

    pub fn log_ids_allocated(&self) -> u64 {
        self.sequences.total_allocated(LOG_ID_SEQ)
    }

    pub fn attachment_ids_allocated(&self) -> u64 {
        self.sequences.total_allocated(ATTACHMENT_ID_SEQ)
    }
}
