//! Builders for source records and attachment payloads used across tests.

use crate::models::{EmbeddedAttachment, PayloadSource, SourceLogRecord};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

/// 2019-03-14T15:09:26Z, so default paths land under `{project}/2019-03/{launch}`
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 3, 14, 15, 9, 26)
        .single()
        .unwrap_or_default()
}

/// Record for item 42 with message `message {id}`
pub fn record_at(id: &str, project_id: i64, launch_id: i64) -> SourceLogRecord {
    SourceLogRecord::new(
        id,
        fixed_time(),
        format!("message {id}"),
        42,
        project_id,
        launch_id,
    )
}

pub fn log_record(id: &str) -> SourceLogRecord {
    record_at(id, 1, 1)
}

pub fn text_attachment(filename: &str) -> EmbeddedAttachment {
    EmbeddedAttachment::inline(filename, "text/plain", b"java.lang.AssertionError".to_vec())
}

pub fn png_attachment(filename: &str) -> EmbeddedAttachment {
    EmbeddedAttachment::inline(filename, "image/png", png_bytes())
}

/// Attachment whose payload cannot be read
pub fn unreadable_attachment(filename: &str) -> EmbeddedAttachment {
    EmbeddedAttachment::new(filename, "text/plain", Arc::new(FailingPayload))
}

/// A valid 8x8 PNG
pub fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([30, 144, 255])));
    let mut out = Cursor::new(Vec::new());
    match img.write_to(&mut out, ImageFormat::Png) {
        Ok(()) => out.into_inner(),
        Err(_) => Vec::new(),
    }
}

#[derive(Debug)]
pub struct FailingPayload;

#[async_trait]
impl PayloadSource for FailingPayload {
    async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "payload chunk missing",
        ))
    }
}
