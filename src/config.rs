//! # Migration Configuration
//!
//! Layered configuration for the log migration: built-in defaults, an optional TOML
//! file, then environment overrides of the form `LOGMIG__SECTION__KEY`
//! (for example `LOGMIG__BATCH__BATCH_SIZE=1000`).
//!
//! ```rust,no_run
//! use log_migration::config::MigrationConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MigrationConfig::load(Some(Path::new("config/migration.toml")))?;
//! println!("batch size: {}", config.batch.batch_size);
//! # Ok(())
//! # }
//! ```

use crate::constants::{batch, sequences, storage};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const ENV_PREFIX: &str = "LOGMIG";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub database: DatabaseConfig,
    pub blob_store: BlobStoreConfig,
    pub batch: BatchConfig,
}

/// Target database connection settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/log_migration_development".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

/// Filesystem blob store settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BlobStoreConfig {
    pub root_dir: PathBuf,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("data/storage"),
            thumbnail_width: storage::DEFAULT_THUMBNAIL_WIDTH,
            thumbnail_height: storage::DEFAULT_THUMBNAIL_HEIGHT,
        }
    }
}

/// Batch writing settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// How many times a batch is re-submitted after an integrity violation.
    pub max_integrity_retries: u32,
    pub log_sequence: String,
    pub attachment_sequence: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: batch::DEFAULT_BATCH_SIZE,
            max_integrity_retries: batch::DEFAULT_MAX_INTEGRITY_RETRIES,
            log_sequence: sequences::LOG_ID_SEQ.to_string(),
            attachment_sequence: sequences::ATTACHMENT_ID_SEQ.to_string(),
        }
    }
}

impl MigrationConfig {
    /// Load defaults, then `path` (if given), then `LOGMIG__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the handful of well-known environment variables.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database.url = db_url;
        }

        if let Ok(batch_size) = std::env::var("LOGMIG_BATCH_SIZE") {
            config.batch.batch_size = batch_size.parse().map_err(|e| {
                ConfigurationError::invalid_value("batch.batch_size", &batch_size, format!("{e}"))
            })?;
        }

        if let Ok(retries) = std::env::var("LOGMIG_MAX_INTEGRITY_RETRIES") {
            config.batch.max_integrity_retries = retries.parse().map_err(|e| {
                ConfigurationError::invalid_value(
                    "batch.max_integrity_retries",
                    &retries,
                    format!("{e}"),
                )
            })?;
        }

        if let Ok(root) = std::env::var("LOGMIG_STORAGE_ROOT") {
            config.blob_store.root_dir = PathBuf::from(root);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.batch.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch.batch_size",
                "0",
                "must be greater than zero",
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "must be greater than zero",
            ));
        }
        if self.blob_store.thumbnail_width == 0 || self.blob_store.thumbnail_height == 0 {
            return Err(ConfigurationError::invalid_value(
                "blob_store.thumbnail_width/thumbnail_height",
                format!(
                    "{}x{}",
                    self.blob_store.thumbnail_width, self.blob_store.thumbnail_height
                ),
                "thumbnail dimensions must be non-zero",
            ));
        }
        for (field, value) in [
            ("batch.log_sequence", &self.batch.log_sequence),
            ("batch.attachment_sequence", &self.batch.attachment_sequence),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value.as_str(),
                    "sequence name must not be empty",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
