//! # Attachment Model
//!
//! Relational metadata for a blob-stored attachment. Maps to the `attachment` table:
//! ```sql
//! CREATE TABLE attachment (
//!   id BIGINT PRIMARY KEY,
//!   file_id VARCHAR NOT NULL,
//!   thumbnail_id VARCHAR,
//!   content_type VARCHAR NOT NULL,
//!   project_id BIGINT NOT NULL,
//!   launch_id BIGINT NOT NULL,
//!   item_id BIGINT NOT NULL
//! );
//! ```
//!
//! `file_id` and `thumbnail_id` hold blob store keys. A row is only worth
//! committing when the bytes behind those keys exist, which is why the batch
//! writer deletes the keys of every row that does not commit.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Attachment {
    pub id: i64,
    pub file_id: String,
    pub thumbnail_id: Option<String>,
    pub content_type: String,
    pub project_id: i64,
    pub launch_id: i64,
    pub item_id: i64,
}

/// Parameters of an attachment row to be inserted, with a pre-allocated id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttachment {
    pub id: i64,
    pub file_id: String,
    pub thumbnail_id: Option<String>,
    pub content_type: String,
    pub project_id: i64,
    pub launch_id: i64,
    pub item_id: i64,
    /// Business key of the owning log record. Not persisted; the insert skips the
    /// attachment when that log record already exists.
    pub owner_uuid: String,
}

/// Bind parameters per attachment row in a batched insert
pub const ATTACHMENT_ROW_COLUMNS: usize = 8;

impl NewAttachment {
    /// Every blob store key this row references
    pub fn blob_keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.file_id.as_str()).chain(self.thumbnail_id.as_deref())
    }
}

impl Attachment {
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, file_id, thumbnail_id, content_type, project_id, launch_id, item_id
            FROM attachment
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attachment")
            .fetch_one(pool)
            .await
    }
}
