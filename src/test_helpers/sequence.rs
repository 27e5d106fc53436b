//! Sequence source that remembers every allocation it served.

use crate::database::sequence::{AtomicSequenceSource, SequenceError, SequenceSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationCall {
    pub sequence: String,
    pub count: u32,
    pub first: i64,
}

#[derive(Debug, Default)]
pub struct RecordingSequenceSource {
    inner: AtomicSequenceSource,
    calls: Mutex<Vec<AllocationCall>>,
    unavailable: AtomicBool,
}

impl RecordingSequenceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls_for(&self, sequence: &str) -> Vec<AllocationCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.sequence == sequence)
            .cloned()
            .collect()
    }

    /// Sum of all counts served for `sequence`
    pub fn total_allocated(&self, sequence: &str) -> u64 {
        self.calls_for(sequence)
            .iter()
            .map(|call| u64::from(call.count))
            .sum()
    }
}

#[async_trait]
impl SequenceSource for RecordingSequenceSource {
    async fn next_range(&self, sequence_name: &str, count: u32) -> Result<i64, SequenceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SequenceError::unavailable(
                sequence_name,
                "sequence source marked unavailable",
            ));
        }
        let first = self.inner.next_range(sequence_name, count).await?;
        self.calls.lock().push(AllocationCall {
            sequence: sequence_name.to_string(),
            count,
            first,
        });
        Ok(first)
    }
}
