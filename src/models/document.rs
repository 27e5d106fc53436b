//! # Document Mapping
//!
//! Validated conversion from a loosely-typed source document (MongoDB extended
//! JSON as produced by an export) into a [`SourceLogRecord`]. Field presence and
//! types are checked once here so the batch writer only ever sees well-formed
//! records.
//!
//! Recognised document shape:
//!
//! ```json
//! {
//!   "_id": { "$oid": "5c1a2b3c4d5e6f7a8b9c0d1e" },
//!   "logTime": { "$date": "2019-03-14T15:09:26Z" },
//!   "logMsg": "step finished",
//!   "itemId": 42,
//!   "projectId": 7,
//!   "launchId": 99,
//!   "last_modified": { "$date": 1552576166000 },
//!   "level": { "log_level": 40000 },
//!   "file": { "filename": "screen.png", "contentType": "image/png", "path": "/export/files/screen.png" }
//! }
//! ```
//!
//! `last_modified`, `level` and `file` are optional.

use crate::constants::DEFAULT_LOG_LEVEL;
use crate::models::source_log_record::{EmbeddedAttachment, SourceLogRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Convert one source document into a record.
///
/// Relative `file.path` values are resolved against `payload_root`.
pub fn record_from_document(
    document: &Value,
    payload_root: &Path,
) -> Result<SourceLogRecord, DocumentMappingError> {
    let object = document
        .as_object()
        .ok_or_else(|| DocumentMappingError::invalid_field("<document>", "expected an object"))?;

    let id = required(object, "_id").and_then(|v| object_id("_id", v))?;
    let log_time = required(object, "logTime").and_then(|v| timestamp("logTime", v))?;
    let message = required(object, "logMsg").and_then(|v| string("logMsg", v))?;
    let item_id = required(object, "itemId").and_then(|v| integer("itemId", v))?;
    let project_id = required(object, "projectId").and_then(|v| integer("projectId", v))?;
    let launch_id = required(object, "launchId").and_then(|v| integer("launchId", v))?;

    let mut record = SourceLogRecord::new(id, log_time, message, item_id, project_id, launch_id);

    if let Some(value) = present(object, "last_modified") {
        record.last_modified = Some(timestamp("last_modified", value)?);
    }

    record.log_level = match present(object, "level") {
        Some(level) => match level.get("log_level").filter(|v| !v.is_null()) {
            Some(value) => {
                let level = integer("level.log_level", value)?;
                i32::try_from(level).map_err(|_| {
                    DocumentMappingError::invalid_field("level.log_level", "out of range for i32")
                })?
            }
            None => DEFAULT_LOG_LEVEL,
        },
        None => DEFAULT_LOG_LEVEL,
    };

    if let Some(file) = present(object, "file") {
        record.attachment = Some(attachment(file, payload_root)?);
    }

    Ok(record)
}

fn attachment(file: &Value, payload_root: &Path) -> Result<EmbeddedAttachment, DocumentMappingError> {
    let file = file
        .as_object()
        .ok_or_else(|| DocumentMappingError::invalid_field("file", "expected an object"))?;

    let filename = required(file, "filename")
        .map_err(|_| DocumentMappingError::missing_field("file.filename"))
        .and_then(|v| string("file.filename", v))?;
    let content_type = present(file, "contentType")
        .map(|v| string("file.contentType", v))
        .transpose()?
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let path = required(file, "path")
        .map_err(|_| DocumentMappingError::missing_field("file.path"))
        .and_then(|v| string("file.path", v))?;

    Ok(EmbeddedAttachment::from_file(
        filename,
        content_type,
        payload_root.join(path),
    ))
}

type Object = serde_json::Map<String, Value>;

fn present<'a>(object: &'a Object, field: &str) -> Option<&'a Value> {
    object.get(field).filter(|v| !v.is_null())
}

fn required<'a>(object: &'a Object, field: &str) -> Result<&'a Value, DocumentMappingError> {
    present(object, field).ok_or_else(|| DocumentMappingError::missing_field(field))
}

fn string(field: &str, value: &Value) -> Result<String, DocumentMappingError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DocumentMappingError::invalid_field(field, "expected a string"))
}

fn object_id(field: &str, value: &Value) -> Result<String, DocumentMappingError> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Object(map) => map
            .get("$oid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DocumentMappingError::invalid_field(field, "expected {\"$oid\": string}")),
        _ => Err(DocumentMappingError::invalid_field(
            field,
            "expected a non-empty string or {\"$oid\": string}",
        )),
    }
}

fn integer(field: &str, value: &Value) -> Result<i64, DocumentMappingError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| DocumentMappingError::invalid_field(field, "expected an integer")),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| DocumentMappingError::invalid_field(field, format!("'{s}' is not an integer"))),
        Value::Object(map) => match map.get("$numberLong").or_else(|| map.get("$numberInt")) {
            Some(inner) => integer(field, inner),
            None => Err(DocumentMappingError::invalid_field(field, "expected an integer")),
        },
        _ => Err(DocumentMappingError::invalid_field(field, "expected an integer")),
    }
}

fn timestamp(field: &str, value: &Value) -> Result<DateTime<Utc>, DocumentMappingError> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| DocumentMappingError::invalid_field(field, format!("bad RFC 3339 timestamp: {e}"))),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| DocumentMappingError::invalid_field(field, "bad epoch milliseconds")),
        Value::Object(map) => match map.get("$date") {
            Some(inner) => timestamp(field, inner),
            None => Err(DocumentMappingError::invalid_field(field, "expected {\"$date\": ...}")),
        },
        _ => Err(DocumentMappingError::invalid_field(field, "expected a timestamp")),
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DocumentMappingError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl DocumentMappingError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
