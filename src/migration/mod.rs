//! # Migration Core
//!
//! Batch writing of source log records into the relational schema.
//!
//! ## Key Components
//!
//! - [`batch_writer`] - Allocation, extraction, insertion and the integrity retry loop
//! - [`extractor`] - Moves one embedded payload (and its thumbnail) into the blob store
//! - [`ledger`] - Per-attempt list of blob keys written, for compensation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use log_migration::config::BatchConfig;
//! use log_migration::database::AtomicSequenceSource;
//! use log_migration::migration::LogBatchWriter;
//! use log_migration::models::SourceLogRecord;
//! use log_migration::storage::DefaultFilePathGenerator;
//! use log_migration::test_helpers::{MemoryBlobStore, MemoryRelationalSink};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let writer = LogBatchWriter::new(
//!     Arc::new(AtomicSequenceSource::default()),
//!     Arc::new(MemoryBlobStore::new()),
//!     Arc::new(DefaultFilePathGenerator),
//!     Arc::new(MemoryRelationalSink::new()),
//!     &BatchConfig::default(),
//! );
//!
//! let record = SourceLogRecord::new("5c8a-01", chrono::Utc::now(), "step started", 42, 1, 7);
//! let outcome = writer.write_batch(vec![record]).await?;
//! println!("inserted {} log rows", outcome.logs_inserted);
//! # Ok(())
//! # }
//! ```

pub mod batch_writer;
pub mod extractor;
pub mod ledger;

pub use batch_writer::{BatchWriteError, BatchWriteOutcome, LogBatchWriter};
pub use extractor::{AttachmentExtractor, ExtractionError, StoredAttachment};
pub use ledger::{BlobLedger, CompensationReport};
