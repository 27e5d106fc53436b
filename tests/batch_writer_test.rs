mod common;

use common::WriterHarness;
use log_migration::constants::sequences::{ATTACHMENT_ID_SEQ, LOG_ID_SEQ};
use log_migration::database::IdRange;
use log_migration::migration::BatchWriteError;
use log_migration::test_helpers::{
    log_record, png_attachment, text_attachment, unreadable_attachment,
};
use std::collections::HashSet;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_records_without_attachments_never_touch_blob_store() {
    let harness = WriterHarness::new();
    let records = vec![log_record("a"), log_record("b"), log_record("c")];

    let outcome = assert_ok!(harness.writer.write_batch(records).await);

    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.logs_inserted, 3);
    assert_eq!(outcome.attachments_inserted, 0);
    assert_eq!(harness.sink.log_count(), 3);
    assert_eq!(harness.sink.attachment_count(), 0);
    assert_eq!(harness.blobs.total_calls(), 0);

    // no attachment range is requested for an attachment-free batch
    assert!(harness.sequences.calls_for(ATTACHMENT_ID_SEQ).is_empty());
    assert_eq!(harness.log_ids_allocated(), 3);

    let ids: Vec<i64> = harness.sink.log_rows().iter().map(|row| row.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(harness
        .sink
        .log_rows()
        .iter()
        .all(|row| row.attachment_id.is_none()));
}

#[tokio::test]
async fn test_png_attachment_gets_file_and_thumbnail_keys() {
    let harness = WriterHarness::new();
    let records = vec![
        log_record("plain"),
        log_record("with-png").with_attachment(png_attachment("screen.png")),
    ];

    let outcome = assert_ok!(harness.writer.write_batch(records).await);

    assert_eq!(outcome.logs_inserted, 2);
    assert_eq!(outcome.attachments_inserted, 1);
    assert_eq!(outcome.blobs_written, 2);
    assert_eq!(harness.attachment_ids_allocated(), 1);
    assert_eq!(harness.log_ids_allocated(), 2);

    let attachments = harness.sink.attachment_rows();
    assert_eq!(attachments.len(), 1);
    let attachment = &attachments[0];
    assert_eq!(attachment.content_type, "image/png");
    assert!(harness.blobs.contains(&attachment.file_id));
    let thumbnail_id = attachment.thumbnail_id.as_deref().unwrap();
    assert!(harness.blobs.contains(thumbnail_id));

    let logs = harness.sink.log_rows();
    let referencing: Vec<_> = logs.iter().filter(|row| row.attachment_id.is_some()).collect();
    assert_eq!(referencing.len(), 1);
    assert_eq!(referencing[0].uuid, "with-png");
    assert_eq!(referencing[0].attachment_id, Some(attachment.id));

    // file name carries the log row id of the owning record
    let owner_id = referencing[0].id;
    assert_eq!(
        harness.blobs.saved_paths(),
        vec![
            format!("1/2019-03/1/{owner_id}-screen.png"),
            format!("1/2019-03/1/thumbnail-{owner_id}-screen.png"),
        ]
    );
}

#[tokio::test]
async fn test_non_image_attachment_gets_no_thumbnail() {
    let harness = WriterHarness::new();
    let records = vec![log_record("txt").with_attachment(text_attachment("trace.txt"))];

    harness.writer.write_batch(records).await.unwrap();

    assert_eq!(harness.blobs.thumbnail_calls(), 0);
    assert!(harness.sink.attachment_rows()[0].thumbnail_id.is_none());
}

#[tokio::test]
async fn test_nul_in_message_is_compensated_and_retried() {
    let harness = WriterHarness::new();
    let records = vec![
        log_record("dirty")
            .with_attachment(text_attachment("trace.txt"))
            .tap_message("assert\0failed"),
        log_record("clean").with_attachment(png_attachment("screen.png")),
    ];

    let outcome = harness.writer.write_batch(records).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.messages_sanitized, 1);
    assert_eq!(outcome.blobs_written, 6);
    assert_eq!(outcome.blobs_compensated, 3);

    // every blob of the failed attempt is gone, only committed ones remain
    let deleted = harness.blobs.deleted_keys();
    assert_eq!(deleted.len(), 3);
    assert!(deleted.iter().all(|key| !harness.blobs.contains(key)));
    assert_eq!(harness.blobs.blob_count(), 3);

    let submitted = harness.sink.submitted_logs();
    assert_eq!(submitted.len(), 2);
    assert!(submitted[0].iter().any(|row| row.log_message.contains('\0')));
    assert!(submitted[1].iter().all(|row| !row.log_message.contains('\0')));

    let logs = harness.sink.log_rows();
    assert_eq!(logs.len(), 2);
    let uuids: HashSet<_> = logs.iter().map(|row| row.uuid.as_str()).collect();
    assert_eq!(uuids, HashSet::from(["dirty", "clean"]));
    assert!(logs.iter().any(|row| row.log_message == "assertfailed"));

    for attachment in harness.sink.attachment_rows() {
        for key in std::iter::once(attachment.file_id.as_str()).chain(attachment.thumbnail_id.as_deref()) {
            assert!(harness.blobs.contains(key));
        }
    }
}

#[tokio::test]
async fn test_resubmitting_written_batch_adds_nothing() {
    let harness = WriterHarness::new();
    let records = vec![
        log_record("one"),
        log_record("two").with_attachment(png_attachment("screen.png")),
        log_record("three").with_attachment(text_attachment("trace.txt")),
    ];

    let first = harness.writer.write_batch(records.clone()).await.unwrap();
    let blobs_after_first = harness.blobs.keys();

    let second = harness.writer.write_batch(records).await.unwrap();

    assert_eq!(first.logs_inserted, 3);
    assert_eq!(first.attachments_inserted, 2);
    assert_eq!(second.attempts, 1);
    assert_eq!(second.logs_inserted, 0);
    assert_eq!(second.attachments_inserted, 0);
    assert_eq!(second.blobs_compensated, second.blobs_written);

    assert_eq!(harness.sink.log_count(), 3);
    assert_eq!(harness.sink.attachment_count(), 2);
    assert_eq!(harness.blobs.keys(), blobs_after_first);
}

#[tokio::test]
async fn test_duplicate_uuid_in_batch_leaves_no_orphan_attachment() {
    let harness = WriterHarness::new();
    let records = vec![
        log_record("twin").with_attachment(text_attachment("a.txt")),
        log_record("twin").with_attachment(text_attachment("b.txt")),
    ];

    let outcome = assert_ok!(harness.writer.write_batch(records).await);

    assert_eq!(outcome.logs_inserted, 1);
    assert_eq!(outcome.attachments_inserted, 1);
    assert_eq!(outcome.blobs_written, 1);
    assert_eq!(harness.attachment_ids_allocated(), 1);

    let attachments = harness.sink.attachment_rows();
    assert_eq!(attachments.len(), 1);
    let logs = harness.sink.log_rows();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].attachment_id, Some(attachments[0].id));
    assert_eq!(harness.blobs.blob_count(), 1);
    assert!(harness.blobs.contains(&attachments[0].file_id));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let harness = WriterHarness::with_retries(1);
    harness.sink.fail_next_with_integrity_violation(usize::MAX);
    let records = vec![log_record("x").with_attachment(png_attachment("screen.png"))];

    let err = harness.writer.write_batch(records).await.unwrap_err();

    match err {
        BatchWriteError::RetriesExhausted { attempts, last_error } => {
            assert_eq!(attempts, 2);
            assert!(last_error.is_integrity_violation());
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(harness.sink.insert_calls(), 2);
    assert_eq!(harness.blobs.blob_count(), 0);
}

#[tokio::test]
async fn test_zero_retries_fails_on_first_violation() {
    let harness = WriterHarness::with_retries(0);
    harness.sink.fail_next_with_integrity_violation(1);

    let err = assert_err!(harness.writer.write_batch(vec![log_record("x")]).await);

    assert!(err.is_retries_exhausted());
    assert_eq!(harness.sink.insert_calls(), 1);
}

#[tokio::test]
async fn test_unreadable_payload_cleans_up_earlier_blobs() {
    let harness = WriterHarness::new();
    let records = vec![
        log_record("first").with_attachment(png_attachment("screen.png")),
        log_record("second").with_attachment(unreadable_attachment("gone.txt")),
    ];

    let err = harness.writer.write_batch(records).await.unwrap_err();

    assert!(matches!(
        err,
        BatchWriteError::AttachmentReadFailure { ref record_id, .. } if record_id == "second"
    ));
    assert_eq!(harness.blobs.deleted_keys().len(), 2);
    assert_eq!(harness.blobs.blob_count(), 0);
    assert_eq!(harness.sink.insert_calls(), 0);
}

#[tokio::test]
async fn test_allocation_failure_is_fatal() {
    let harness = WriterHarness::new();
    harness.sequences.set_unavailable(true);

    let err = harness
        .writer
        .write_batch(vec![log_record("x").with_attachment(png_attachment("s.png"))])
        .await
        .unwrap_err();

    assert!(matches!(err, BatchWriteError::AllocationFailure(_)));
    assert_eq!(harness.blobs.total_calls(), 0);
    assert_eq!(harness.sink.insert_calls(), 0);
}

#[tokio::test]
async fn test_blob_store_failure_is_fatal() {
    let harness = WriterHarness::new();
    harness.blobs.fail_saves(true);

    let err = harness
        .writer
        .write_batch(vec![log_record("x").with_attachment(text_attachment("t.txt"))])
        .await
        .unwrap_err();

    assert!(matches!(err, BatchWriteError::BlobStoreFailure { .. }));
    assert_eq!(harness.sink.insert_calls(), 0);
}

#[tokio::test]
async fn test_database_failure_is_not_retried() {
    let harness = WriterHarness::new();
    harness.sink.fail_next_with_database_error(1);

    let err = harness
        .writer
        .write_batch(vec![log_record("x").with_attachment(png_attachment("s.png"))])
        .await
        .unwrap_err();

    assert!(matches!(err, BatchWriteError::DatabaseFailure(_)));
    assert_eq!(harness.sink.insert_calls(), 1);
    assert_eq!(harness.blobs.blob_count(), 0);
}

#[tokio::test]
async fn test_concurrent_batches_get_disjoint_ranges() {
    let harness = WriterHarness::new();

    let tasks = (0..8).map(|batch| {
        let writer = harness.writer.clone();
        let records = (0..5)
            .map(|i| {
                let record = log_record(&format!("b{batch}-r{i}"));
                if i % 2 == 0 {
                    record.with_attachment(text_attachment("t.txt"))
                } else {
                    record
                }
            })
            .collect::<Vec<_>>();
        tokio::spawn(async move { writer.write_batch(records).await })
    });

    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    for sequence in [LOG_ID_SEQ, ATTACHMENT_ID_SEQ] {
        let ranges: Vec<IdRange> = harness
            .sequences
            .calls_for(sequence)
            .iter()
            .map(|call| IdRange::new(call.first, call.count))
            .collect();
        assert_eq!(ranges.len(), 8);
        for (i, a) in ranges.iter().enumerate() {
            for b in &ranges[i + 1..] {
                assert!(!a.overlaps(b), "{sequence}: {a:?} overlaps {b:?}");
            }
        }
    }

    assert_eq!(harness.sink.log_count(), 40);
    assert_eq!(harness.sink.attachment_count(), 24);
    let ids: HashSet<i64> = harness.sink.log_rows().iter().map(|row| row.id).collect();
    assert_eq!(ids.len(), 40);
}

trait TapMessage {
    fn tap_message(self, message: &str) -> Self;
}

impl TapMessage for log_migration::models::SourceLogRecord {
    fn tap_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }
}
