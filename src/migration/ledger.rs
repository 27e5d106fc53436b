//! Per-attempt record of blob keys written, used to undo blob writes when an
//! attempt does not commit.

use crate::storage::BlobStore;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct BlobLedger {
    keys: Vec<String>,
}

/// What a cleanup pass managed to delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompensationReport {
    pub deleted: usize,
    pub failed: usize,
}

impl BlobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: impl Into<String>) {
        self.keys.push(key.into());
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Delete every recorded key, best effort. Failures are logged and counted,
    /// never returned. The ledger is empty afterwards.
    pub async fn compensate(&mut self, store: &dyn BlobStore) -> CompensationReport {
        let keys = std::mem::take(&mut self.keys);
        delete_keys(store, keys.iter().map(String::as_str)).await
    }
}

/// Best-effort deletion of blob keys
pub async fn delete_keys<'a>(
    store: &dyn BlobStore,
    keys: impl IntoIterator<Item = &'a str>,
) -> CompensationReport {
    let mut report = CompensationReport::default();
    for key in keys {
        match store.delete(key).await {
            Ok(()) => {
                debug!(key = %key, "Deleted blob");
                report.deleted += 1;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to delete blob during compensation");
                report.failed += 1;
            }
        }
    }
    report
}
