//! # Source Log Record
//!
//! A log record as read from the document store, with its optional embedded
//! attachment. Records are immutable input except for message sanitization,
//! which the batch writer applies between attempts.

use crate::constants::{storage, DEFAULT_LOG_LEVEL};
use crate::models::log_row::NewLogRow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Readable source of an attachment's bytes.
///
/// Reading happens during extraction, so a source that cannot be read fails the
/// batch at that point rather than when the record is constructed.
#[async_trait]
pub trait PayloadSource: Send + Sync + fmt::Debug {
    async fn read_all(&self) -> std::io::Result<Vec<u8>>;
}

/// Payload already held in memory
#[derive(Clone)]
pub struct InlinePayload(Arc<[u8]>);

impl InlinePayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }
}

impl fmt::Debug for InlinePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InlinePayload({} bytes)", self.0.len())
    }
}

#[async_trait]
impl PayloadSource for InlinePayload {
    async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        Ok(self.0.to_vec())
    }
}

/// Payload exported to a local file (e.g. a dumped GridFS chunk set)
#[derive(Debug, Clone)]
pub struct FilePayload {
    path: PathBuf,
}

impl FilePayload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PayloadSource for FilePayload {
    async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

/// Binary attachment embedded in a source record
#[derive(Debug, Clone)]
pub struct EmbeddedAttachment {
    pub filename: String,
    pub content_type: String,
    pub payload: Arc<dyn PayloadSource>,
}

impl EmbeddedAttachment {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        payload: Arc<dyn PayloadSource>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            payload,
        }
    }

    pub fn inline(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(filename, content_type, Arc::new(InlinePayload::new(bytes)))
    }

    pub fn from_file(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self::new(filename, content_type, Arc::new(FilePayload::new(path)))
    }

    pub fn is_image(&self) -> bool {
        is_image_content_type(&self.content_type)
    }
}

/// Whether a declared content type names image content.
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .to_ascii_lowercase()
        .contains(storage::IMAGE_CONTENT_TYPE_MARKER)
}

#[derive(Debug, Clone)]
pub struct SourceLogRecord {
    /// Business key, unique across the source store
    pub id: String,
    pub log_time: DateTime<Utc>,
    pub message: String,
    pub item_id: i64,
    pub project_id: i64,
    pub launch_id: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub log_level: i32,
    pub attachment: Option<EmbeddedAttachment>,
}

impl SourceLogRecord {
    pub fn new(
        id: impl Into<String>,
        log_time: DateTime<Utc>,
        message: impl Into<String>,
        item_id: i64,
        project_id: i64,
        launch_id: i64,
    ) -> Self {
        Self {
            id: id.into(),
            log_time,
            message: message.into(),
            item_id,
            project_id,
            launch_id,
            last_modified: None,
            log_level: DEFAULT_LOG_LEVEL,
            attachment: None,
        }
    }

    pub fn with_level(mut self, log_level: i32) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn with_attachment(mut self, attachment: EmbeddedAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn has_attachment(&self) -> bool {
        self.attachment.is_some()
    }

    /// Strip NUL characters from the message. Returns whether anything was removed.
    pub fn sanitize_message(&mut self) -> bool {
        if !self.message.contains('\0') {
            return false;
        }
        self.message.retain(|c| c != '\0');
        true
    }

    /// Build the log row parameters for this record.
    pub fn to_log_row(&self, id: i64, attachment_id: Option<i64>) -> NewLogRow {
        NewLogRow {
            id,
            uuid: self.id.clone(),
            log_time: self.log_time.naive_utc(),
            log_message: self.message.clone(),
            item_id: self.item_id,
            last_modified: self.last_modified.map(|ts| ts.naive_utc()),
            log_level: self.log_level,
            attachment_id,
        }
    }
}
