//! # Migration Bootstrap
//!
//! Wires the default collaborators into a ready [`LogBatchWriter`]:
//!
//! - `PgSequenceSource` and `PgRelationalSink` on one pool
//! - `FilesystemBlobStore` with base64 keys and thumbnail rendering
//! - `DefaultFilePathGenerator`
//!
//! Callers that want different collaborators build a `LogBatchWriter` directly.

use crate::config::MigrationConfig;
use crate::database::{DatabaseConnection, PgRelationalSink, PgSequenceSource};
use crate::error::Result;
use crate::migration::LogBatchWriter;
use crate::storage::{
    Base64DataEncoder, DefaultFilePathGenerator, FilesystemBlobStore, ThumbnailRenderer,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

/// Handle to a bootstrapped migration
pub struct MigrationBootstrap {
    pub writer: LogBatchWriter,
    pub connection: DatabaseConnection,
    pub config: MigrationConfig,
}

impl MigrationBootstrap {
    /// Validate `config`, connect to the target database and build the writer.
    pub async fn initialize(config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        let connection = DatabaseConnection::connect(&config.database).await?;
        if !connection.health_check().await? {
            warn!("⚠️ BOOTSTRAP: Target database health check returned an unexpected value");
        }
        Ok(Self::with_connection(config, connection))
    }

    /// Build on an existing pool, e.g. one handed out by `#[sqlx::test]`.
    pub fn from_pool(config: MigrationConfig, pool: PgPool) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_connection(
            config,
            DatabaseConnection::from_pool(pool),
        ))
    }

    fn with_connection(config: MigrationConfig, connection: DatabaseConnection) -> Self {
        let pool = connection.pool().clone();
        let blob_store = FilesystemBlobStore::new(&config.blob_store.root_dir)
            .with_encoder(Arc::new(Base64DataEncoder))
            .with_thumbnail_renderer(ThumbnailRenderer::new(
                config.blob_store.thumbnail_width,
                config.blob_store.thumbnail_height,
            ));

        let writer = LogBatchWriter::new(
            Arc::new(PgSequenceSource::new(pool.clone())),
            Arc::new(blob_store),
            Arc::new(DefaultFilePathGenerator),
            Arc::new(PgRelationalSink::new(pool)),
            &config.batch,
        );

        info!(
            blob_root = %config.blob_store.root_dir.display(),
            batch_size = config.batch.batch_size,
            max_integrity_retries = config.batch.max_integrity_retries,
            "🚀 BOOTSTRAP: Log migration writer ready"
        );

        Self {
            writer,
            connection,
            config,
        }
    }

    pub fn writer(&self) -> &LogBatchWriter {
        &self.writer
    }

    pub fn pool(&self) -> &PgPool {
        self.connection.pool()
    }

    pub async fn shutdown(self) {
        self.connection.close().await;
        info!("🛑 BOOTSTRAP: Database pool closed");
    }
}
