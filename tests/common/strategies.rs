use log_migration::models::SourceLogRecord;
use log_migration::test_helpers::{png_attachment, record_at, text_attachment};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    None,
    Text,
    Png,
}

/// Shape of one generated record: attachment kind and whether the message carries a NUL
pub fn record_shape_strategy() -> impl Strategy<Value = (AttachmentKind, bool)> {
    (
        prop_oneof![
            3 => Just(AttachmentKind::None),
            1 => Just(AttachmentKind::Text),
            1 => Just(AttachmentKind::Png),
        ],
        prop::bool::weighted(0.1),
    )
}

pub fn batch_shape_strategy() -> impl Strategy<Value = Vec<(AttachmentKind, bool)>> {
    prop::collection::vec(record_shape_strategy(), 1..24)
}

/// Records with unique ids built from generated shapes
pub fn build_batch(prefix: &str, shapes: &[(AttachmentKind, bool)]) -> Vec<SourceLogRecord> {
    shapes
        .iter()
        .enumerate()
        .map(|(i, (kind, nul))| {
            let mut record = record_at(&format!("{prefix}-{i}"), 3, 11);
            if *nul {
                record.message.push('\0');
            }
            match kind {
                AttachmentKind::None => record,
                AttachmentKind::Text => record.with_attachment(text_attachment("trace.log")),
                AttachmentKind::Png => record.with_attachment(png_attachment("shot.png")),
            }
        })
        .collect()
}
