#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Log Migration
//!
//! Batch migration of document-stored log records into a relational schema, with
//! embedded attachments relocated to an external blob store.
//!
//! ## Overview
//!
//! A batch of [`SourceLogRecord`]s becomes one transaction of `log` rows plus
//! `attachment` rows. Identifiers are pre-allocated in contiguous ranges from a
//! shared counter, attachment bytes (and thumbnails for images) are written to
//! the blob store before the insert, and blob writes of any attempt that does not
//! commit are deleted again. Integrity violations, typically NUL characters in a
//! message, are compensated and retried a bounded number of times.
//!
//! ## Module Organization
//!
//! - [`migration`] - Batch writer, attachment extractor, compensation ledger
//! - [`database`] - Pool, sequence allocation and the relational sink
//! - [`storage`] - Blob store contract, filesystem store, key encoding, paths, thumbnails
//! - [`models`] - Source records, relational rows and document mapping
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Crate-level error type
//! - [`bootstrap`] - Wiring of the default collaborators
//! - [`test_helpers`] - In-memory collaborators for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use log_migration::bootstrap::MigrationBootstrap;
//! use log_migration::config::MigrationConfig;
//! use log_migration::logging::init_structured_logging;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! init_structured_logging();
//! let config = MigrationConfig::from_env()?;
//! let migration = MigrationBootstrap::initialize(config).await?;
//!
//! let outcome = migration.writer().write_in_batches(Vec::new()).await?;
//! println!("inserted {} log rows", outcome.logs_inserted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                      # Unit and in-memory integration tests
//! cargo test -- --include-ignored # Also PostgreSQL-backed tests (needs DATABASE_URL)
//! ```

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod logging;
pub mod migration;
pub mod models;
pub mod storage;
pub mod test_helpers;

pub use bootstrap::MigrationBootstrap;
pub use config::{BatchConfig, BlobStoreConfig, DatabaseConfig, MigrationConfig};
pub use database::{
    AtomicSequenceSource, DatabaseConnection, PgRelationalSink, PgSequenceSource,
    RelationalSink, SequenceAllocator, SequenceSource,
};
pub use error::{MigrationError, Result};
pub use migration::{BatchWriteError, BatchWriteOutcome, LogBatchWriter};
pub use models::{EmbeddedAttachment, SourceLogRecord};
pub use storage::{BlobStore, FilesystemBlobStore};
