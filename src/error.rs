//! # Error Handling
//!
//! Crate-level error type. Each component owns a focused error enum; this type
//! aggregates them for callers that drive the whole migration.

use crate::config::ConfigurationError;
use crate::database::sequence::SequenceError;
use crate::database::sink::SinkError;
use crate::migration::batch_writer::BatchWriteError;
use crate::models::document::DocumentMappingError;
use crate::storage::BlobStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Sequence allocation error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Blob store error: {0}")]
    BlobStore(#[from] BlobStoreError),

    #[error("Relational sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Document mapping error: {0}")]
    DocumentMapping(#[from] DocumentMappingError),

    #[error("Batch write error: {0}")]
    BatchWrite(#[from] BatchWriteError),
}

pub type Result<T> = std::result::Result<T, MigrationError>;
