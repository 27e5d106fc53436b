//! # Database Operations
//!
//! Target-side database access for the migration.
//!
//! ## Key Components
//!
//! - [`connection`] - Pool construction and health checks
//! - [`sequence`] - Contiguous id range allocation from shared counters
//! - [`sink`] - Transactional, conflict-tolerant batch inserts
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use log_migration::config::DatabaseConfig;
//! use log_migration::database::{DatabaseConnection, PgSequenceSource, SequenceAllocator};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseConnection::connect(&DatabaseConfig::default()).await?;
//! let source = Arc::new(PgSequenceSource::new(db.pool().clone()));
//! let log_ids = SequenceAllocator::new(source, "log_id_seq");
//! let range = log_ids.allocate(500).await?;
//! println!("reserved ids {}..{}", range.first(), range.end());
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod sequence;
pub mod sink;

pub use connection::DatabaseConnection;
pub use sequence::{
    AtomicSequenceSource, IdRange, PgSequenceSource, SequenceAllocator, SequenceError,
    SequenceSource,
};
pub use sink::{InsertSummary, PgRelationalSink, RelationalSink, SinkError};
