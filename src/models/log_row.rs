//! # Log Row Model
//!
//! Maps to the `log` table:
//! ```sql
//! CREATE TABLE log (
//!   id BIGINT PRIMARY KEY,
//!   uuid VARCHAR NOT NULL UNIQUE,
//!   log_time TIMESTAMP NOT NULL,
//!   log_message TEXT NOT NULL,
//!   item_id BIGINT NOT NULL,
//!   last_modified TIMESTAMP,
//!   log_level INTEGER NOT NULL,
//!   attachment_id BIGINT REFERENCES attachment (id)
//! );
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Persisted log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LogRow {
    pub id: i64,
    pub uuid: String,
    pub log_time: NaiveDateTime,
    pub log_message: String,
    pub item_id: i64,
    pub last_modified: Option<NaiveDateTime>,
    pub log_level: i32,
    pub attachment_id: Option<i64>,
}

/// Parameters of a log row to be inserted, with a pre-allocated id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogRow {
    pub id: i64,
    pub uuid: String,
    pub log_time: NaiveDateTime,
    pub log_message: String,
    pub item_id: i64,
    pub last_modified: Option<NaiveDateTime>,
    pub log_level: i32,
    pub attachment_id: Option<i64>,
}

/// Bind parameters per log row in a batched insert
pub const LOG_ROW_COLUMNS: usize = 8;

impl LogRow {
    pub async fn find_by_uuid(pool: &PgPool, uuid: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, uuid, log_time, log_message, item_id, last_modified, log_level, attachment_id
            FROM log
            WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_item(pool: &PgPool, item_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, uuid, log_time, log_message, item_id, last_modified, log_level, attachment_id
            FROM log
            WHERE item_id = $1
            ORDER BY id
            "#,
        )
        .bind(item_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM log")
            .fetch_one(pool)
            .await
    }
}
