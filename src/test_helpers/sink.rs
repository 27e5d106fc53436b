//! In-memory [`RelationalSink`] with PostgreSQL-like insert semantics:
//! duplicate ids and uuids are skipped, NUL characters in text are rejected,
//! dangling attachment references are rejected, and a rejected batch leaves
//! no trace.

use crate::constants::sqlstate;
use crate::database::sink::{InsertSummary, RelationalSink, SinkError};
use crate::models::{NewAttachment, NewLogRow};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct Tables {
    attachments: BTreeMap<i64, NewAttachment>,
    logs: BTreeMap<i64, NewLogRow>,
    uuids: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryRelationalSink {
    tables: Mutex<Tables>,
    submitted: Mutex<Vec<Vec<NewLogRow>>>,
    insert_calls: AtomicUsize,
    forced_integrity_failures: AtomicUsize,
    forced_database_failures: AtomicUsize,
}

impl MemoryRelationalSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` calls with an integrity violation regardless of content.
    pub fn fail_next_with_integrity_violation(&self, count: usize) {
        self.forced_integrity_failures.store(count, Ordering::SeqCst);
    }

    /// Reject the next `count` calls with a connection-level error.
    pub fn fail_next_with_database_error(&self, count: usize) {
        self.forced_database_failures.store(count, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Log rows of every call, committed or not, in call order
    pub fn submitted_logs(&self) -> Vec<Vec<NewLogRow>> {
        self.submitted.lock().clone()
    }

    pub fn log_rows(&self) -> Vec<NewLogRow> {
        self.tables.lock().logs.values().cloned().collect()
    }

    pub fn attachment_rows(&self) -> Vec<NewAttachment> {
        self.tables.lock().attachments.values().cloned().collect()
    }

    pub fn log_count(&self) -> usize {
        self.tables.lock().logs.len()
    }

    pub fn attachment_count(&self) -> usize {
        self.tables.lock().attachments.len()
    }

    fn take_forced(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn reject_nul(field: &str, value: &str) -> Result<(), SinkError> {
    if value.contains('\0') {
        return Err(SinkError::integrity_violation(
            sqlstate::CHARACTER_NOT_IN_REPERTOIRE,
            format!("invalid byte sequence for encoding \"UTF8\": 0x00 in {field}"),
        ));
    }
    Ok(())
}

#[async_trait]
impl RelationalSink for MemoryRelationalSink {
    async fn insert_batch(
        &self,
        attachments: &[NewAttachment],
        logs: &[NewLogRow],
    ) -> Result<InsertSummary, SinkError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().push(logs.to_vec());

        if Self::take_forced(&self.forced_database_failures) {
            return Err(SinkError::from_sqlx("insert logs", sqlx::Error::PoolTimedOut));
        }
        if Self::take_forced(&self.forced_integrity_failures) {
            return Err(SinkError::integrity_violation(
                "23514",
                "new row violates check constraint",
            ));
        }

        for attachment in attachments {
            reject_nul("attachment.file_id", &attachment.file_id)?;
            reject_nul("attachment.content_type", &attachment.content_type)?;
            if let Some(thumbnail_id) = &attachment.thumbnail_id {
                reject_nul("attachment.thumbnail_id", thumbnail_id)?;
            }
        }
        for log in logs {
            reject_nul("log.uuid", &log.uuid)?;
            reject_nul("log.log_message", &log.log_message)?;
        }

        let mut tables = self.tables.lock();

        let mut new_attachments = BTreeMap::new();
        let mut skipped_attachment_ids = Vec::new();
        for attachment in attachments {
            if tables.uuids.contains(&attachment.owner_uuid)
                || tables.attachments.contains_key(&attachment.id)
                || new_attachments.contains_key(&attachment.id)
            {
                skipped_attachment_ids.push(attachment.id);
            } else {
                new_attachments.insert(attachment.id, attachment.clone());
            }
        }

        let mut new_logs = BTreeMap::new();
        let mut new_uuids = HashSet::new();
        for log in logs {
            if tables.logs.contains_key(&log.id)
                || new_logs.contains_key(&log.id)
                || tables.uuids.contains(&log.uuid)
                || new_uuids.contains(&log.uuid)
            {
                continue;
            }
            if let Some(attachment_id) = log.attachment_id {
                if !tables.attachments.contains_key(&attachment_id)
                    && !new_attachments.contains_key(&attachment_id)
                {
                    return Err(SinkError::IntegrityViolation {
                        code: "23503".to_string(),
                        message: format!(
                            "insert on table \"log\" violates foreign key: attachment {attachment_id} missing"
                        ),
                        constraint: Some("log_attachment_id_fkey".to_string()),
                    });
                }
            }
            new_uuids.insert(log.uuid.clone());
            new_logs.insert(log.id, log.clone());
        }

        let summary = InsertSummary {
            attachments_inserted: new_attachments.len() as u64,
            logs_inserted: new_logs.len() as u64,
            skipped_attachment_ids,
        };
        tables.attachments.extend(new_attachments);
        tables.logs.extend(new_logs);
        tables.uuids.extend(new_uuids);
        Ok(summary)
    }
}
