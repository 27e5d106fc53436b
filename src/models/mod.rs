//! # Data Models
//!
//! Source-side records and the relational rows derived from them.

pub mod attachment;
pub mod document;
pub mod log_row;
pub mod source_log_record;

pub use attachment::{Attachment, NewAttachment};
pub use document::{record_from_document, DocumentMappingError};
pub use log_row::{LogRow, NewLogRow};
pub use source_log_record::{
    is_image_content_type, EmbeddedAttachment, FilePayload, InlinePayload, PayloadSource,
    SourceLogRecord,
};
