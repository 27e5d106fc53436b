//! # Relational Sink
//!
//! Transactional, conflict-tolerant batch insertion of attachment and log rows.
//!
//! Attachment rows are written first so every log row's `attachment_id` points at
//! a row that exists when the transaction commits. Both statements use
//! `ON CONFLICT DO NOTHING`; an attachment row is additionally skipped when its
//! owning log record is already present, so re-submitting a batch that was
//! already written adds nothing.
//!
//! Duplicate keys never surface as errors. Any other constraint or data error
//! (SQLSTATE classes `22` and `23`, e.g. a NUL byte in a text value) surfaces as
//! [`SinkError::IntegrityViolation`] and rolls back the whole batch.

use crate::constants::{sqlstate, MAX_BIND_PARAMETERS};
use crate::models::attachment::{NewAttachment, ATTACHMENT_ROW_COLUMNS};
use crate::models::log_row::{NewLogRow, LOG_ROW_COLUMNS};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, instrument};

/// Result of one committed batch insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub attachments_inserted: u64,
    pub logs_inserted: u64,
    /// Attachment rows dropped because their owning log record already existed
    pub skipped_attachment_ids: Vec<i64>,
}

#[async_trait]
pub trait RelationalSink: Send + Sync {
    /// Insert attachment rows, then log rows, in one transaction.
    async fn insert_batch(
        &self,
        attachments: &[NewAttachment],
        logs: &[NewLogRow],
    ) -> Result<InsertSummary, SinkError>;
}

/// PostgreSQL implementation of [`RelationalSink`]
#[derive(Clone)]
pub struct PgRelationalSink {
    pool: PgPool,
}

impl PgRelationalSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Rows that fit in one statement without exceeding the bind parameter limit
const fn rows_per_statement(columns: usize) -> usize {
    MAX_BIND_PARAMETERS / columns
}

#[async_trait]
impl RelationalSink for PgRelationalSink {
    #[instrument(skip_all, fields(attachments = attachments.len(), logs = logs.len()))]
    async fn insert_batch(
        &self,
        attachments: &[NewAttachment],
        logs: &[NewLogRow],
    ) -> Result<InsertSummary, SinkError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SinkError::from_sqlx("begin", e))?;

        let mut inserted_attachment_ids = HashSet::with_capacity(attachments.len());
        for chunk in attachments.chunks(rows_per_statement(ATTACHMENT_ROW_COLUMNS)) {
            let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO attachment (id, file_id, thumbnail_id, content_type, project_id, launch_id, item_id) \
                 SELECT v.id, v.file_id, v.thumbnail_id, v.content_type, v.project_id, v.launch_id, v.item_id FROM (",
            );
            query.push_values(chunk, |mut row, attachment| {
                row.push_bind(attachment.id)
                    .push_bind(attachment.file_id.as_str())
                    .push_bind(attachment.thumbnail_id.as_deref())
                    .push_bind(attachment.content_type.as_str())
                    .push_bind(attachment.project_id)
                    .push_bind(attachment.launch_id)
                    .push_bind(attachment.item_id)
                    .push_bind(attachment.owner_uuid.as_str());
            });
            query.push(
                ") AS v (id, file_id, thumbnail_id, content_type, project_id, launch_id, item_id, owner_uuid) \
                 WHERE NOT EXISTS (SELECT 1 FROM log l WHERE l.uuid = v.owner_uuid) \
                 ON CONFLICT DO NOTHING RETURNING id",
            );

            let ids: Vec<i64> = query
                .build_query_scalar()
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| SinkError::from_sqlx("insert attachments", e))?;
            inserted_attachment_ids.extend(ids);
        }

        let mut logs_inserted = 0;
        for chunk in logs.chunks(rows_per_statement(LOG_ROW_COLUMNS)) {
            let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO log (id, uuid, log_time, log_message, item_id, last_modified, log_level, attachment_id) ",
            );
            query.push_values(chunk, |mut row, log| {
                row.push_bind(log.id)
                    .push_bind(log.uuid.as_str())
                    .push_bind(log.log_time)
                    .push_bind(log.log_message.as_str())
                    .push_bind(log.item_id)
                    .push_bind(log.last_modified)
                    .push_bind(log.log_level)
                    .push_bind(log.attachment_id);
            });
            query.push(" ON CONFLICT DO NOTHING");

            let result = query
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| SinkError::from_sqlx("insert logs", e))?;
            logs_inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| SinkError::from_sqlx("commit", e))?;

        let skipped_attachment_ids: Vec<i64> = attachments
            .iter()
            .map(|a| a.id)
            .filter(|id| !inserted_attachment_ids.contains(id))
            .collect();

        debug!(
            attachments_inserted = inserted_attachment_ids.len(),
            attachments_skipped = skipped_attachment_ids.len(),
            logs_inserted = logs_inserted,
            "Committed batch insert"
        );

        Ok(InsertSummary {
            attachments_inserted: inserted_attachment_ids.len() as u64,
            logs_inserted,
            skipped_attachment_ids,
        })
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    /// A row violated a constraint other than the idempotent duplicate-key skip,
    /// or carried content the database rejects.
    #[error("Integrity violation [{code}]: {message}")]
    IntegrityViolation {
        code: String,
        message: String,
        constraint: Option<String>,
    },

    #[error("Database error during {operation}: {source}")]
    Database {
        operation: String,
        #[source]
        source: sqlx::Error,
    },
}

impl SinkError {
    pub fn integrity_violation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            code: code.into(),
            message: message.into(),
            constraint: None,
        }
    }

    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::IntegrityViolation { .. })
    }

    /// Classify a sqlx error by SQLSTATE.
    pub fn from_sqlx(operation: &str, err: sqlx::Error) -> Self {
        let violation = match &err {
            sqlx::Error::Database(db_err) => db_err
                .code()
                .filter(|code| is_integrity_sqlstate(code))
                .map(|code| {
                    (
                        code.into_owned(),
                        db_err.message().to_string(),
                        db_err.constraint().map(str::to_string),
                    )
                }),
            _ => None,
        };

        match violation {
            Some((code, message, constraint)) => Self::IntegrityViolation {
                code,
                message,
                constraint,
            },
            None => Self::Database {
                operation: operation.to_string(),
                source: err,
            },
        }
    }
}

/// Whether a SQLSTATE belongs to the integrity constraint or data exception class
pub fn is_integrity_sqlstate(code: &str) -> bool {
    code.starts_with(sqlstate::INTEGRITY_CONSTRAINT_CLASS)
        || code.starts_with(sqlstate::DATA_EXCEPTION_CLASS)
}
