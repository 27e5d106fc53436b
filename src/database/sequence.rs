//! # Sequence Allocation
//!
//! Contiguous id ranges fetched from a shared counter, one round-trip per batch
//! per identifier space.
//!
//! The PostgreSQL source relies on a `multi_nextval(regclass, integer)` function
//! that advances a sequence by `count` under an advisory lock and returns the
//! first value of the reserved block:
//!
//! ```sql
//! CREATE OR REPLACE FUNCTION multi_nextval(use_seqname REGCLASS, use_increment INTEGER)
//! RETURNS BIGINT AS $$
//! DECLARE
//!   reply BIGINT;
//!   lock_id BIGINT := use_seqname::BIGINT;
//! BEGIN
//!   PERFORM pg_advisory_lock(lock_id);
//!   reply := nextval(use_seqname);
//!   PERFORM setval(use_seqname, reply + use_increment - 1, TRUE);
//!   PERFORM pg_advisory_unlock(lock_id);
//!   RETURN reply;
//! END;
//! $$ LANGUAGE plpgsql;
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Shared counter exposing an atomic range fetch.
#[async_trait]
pub trait SequenceSource: Send + Sync {
    /// Reserve `count` consecutive values of `sequence_name` and return the first.
    async fn next_range(&self, sequence_name: &str, count: u32) -> Result<i64, SequenceError>;
}

/// Sequence source backed by `multi_nextval` in the target database
#[derive(Clone)]
pub struct PgSequenceSource {
    pool: PgPool,
}

impl PgSequenceSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SequenceSource for PgSequenceSource {
    async fn next_range(&self, sequence_name: &str, count: u32) -> Result<i64, SequenceError> {
        let increment = i32::try_from(count)
            .map_err(|_| SequenceError::invalid_count(sequence_name, count as usize))?;

        sqlx::query_scalar::<_, i64>("SELECT multi_nextval($1::regclass, $2)")
            .bind(sequence_name)
            .bind(increment)
            .fetch_one(&self.pool)
            .await
            .map_err(|source| SequenceError::Database {
                sequence: sequence_name.to_string(),
                source,
            })
    }
}

/// In-process sequence source for single-process runs and tests.
///
/// Each named counter starts at `start`; a range fetch holds the counter's shard
/// lock for the duration of the increment.
#[derive(Debug)]
pub struct AtomicSequenceSource {
    start: i64,
    counters: DashMap<String, i64>,
}

impl AtomicSequenceSource {
    pub fn new(start: i64) -> Self {
        Self {
            start,
            counters: DashMap::new(),
        }
    }

    /// Next value the named counter would hand out
    pub fn peek(&self, sequence_name: &str) -> i64 {
        self.counters
            .get(sequence_name)
            .map(|value| *value)
            .unwrap_or(self.start)
    }
}

impl Default for AtomicSequenceSource {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl SequenceSource for AtomicSequenceSource {
    async fn next_range(&self, sequence_name: &str, count: u32) -> Result<i64, SequenceError> {
        let mut next = self
            .counters
            .entry(sequence_name.to_string())
            .or_insert(self.start);
        let first = *next;
        *next = first
            .checked_add(i64::from(count))
            .ok_or_else(|| SequenceError::unavailable(sequence_name, "sequence exhausted"))?;
        Ok(first)
    }
}

/// Contiguous block of reserved ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    first: i64,
    len: u32,
}

impl IdRange {
    pub fn new(first: i64, len: u32) -> Self {
        Self { first, len }
    }

    pub fn empty() -> Self {
        Self { first: 0, len: 0 }
    }

    pub fn first(&self) -> i64 {
        self.first
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Exclusive upper bound
    pub fn end(&self) -> i64 {
        self.first.saturating_add(i64::from(self.len))
    }

    pub fn contains(&self, id: i64) -> bool {
        id >= self.first && id < self.end()
    }

    pub fn overlaps(&self, other: &IdRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.first < other.end() && other.first < self.end()
    }

    pub fn iter(&self) -> std::ops::Range<i64> {
        self.first..self.end()
    }
}

/// Allocates id ranges from one named sequence
#[derive(Clone)]
pub struct SequenceAllocator {
    source: Arc<dyn SequenceSource>,
    sequence_name: String,
}

impl std::fmt::Debug for SequenceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceAllocator")
            .field("sequence_name", &self.sequence_name)
            .finish_non_exhaustive()
    }
}

impl SequenceAllocator {
    pub fn new(source: Arc<dyn SequenceSource>, sequence_name: impl Into<String>) -> Self {
        Self {
            source,
            sequence_name: sequence_name.into(),
        }
    }

    pub fn sequence_name(&self) -> &str {
        &self.sequence_name
    }

    /// Reserve `count` ids. A zero count never touches the counter.
    pub async fn allocate(&self, count: usize) -> Result<IdRange, SequenceError> {
        if count == 0 {
            return Ok(IdRange::empty());
        }

        let len = u32::try_from(count)
            .ok()
            .filter(|len| i32::try_from(*len).is_ok())
            .ok_or_else(|| SequenceError::invalid_count(&self.sequence_name, count))?;

        let first = self.source.next_range(&self.sequence_name, len).await?;
        if first.checked_add(i64::from(len)).is_none() {
            return Err(SequenceError::unavailable(
                &self.sequence_name,
                format!("range of {len} starting at {first} overflows i64"),
            ));
        }
        debug!(
            sequence = %self.sequence_name,
            first_id = first,
            count = len,
            "Allocated id range"
        );
        Ok(IdRange::new(first, len))
    }
}

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("Sequence {sequence} unavailable: {message}")]
    Unavailable { sequence: String, message: String },

    #[error("Invalid allocation count {count} for sequence {sequence}")]
    InvalidCount { sequence: String, count: usize },

    #[error("Database error allocating from {sequence}: {source}")]
    Database {
        sequence: String,
        #[source]
        source: sqlx::Error,
    },
}

impl SequenceError {
    pub fn unavailable(sequence: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            sequence: sequence.into(),
            message: message.into(),
        }
    }

    pub fn invalid_count(sequence: impl Into<String>, count: usize) -> Self {
        Self::InvalidCount {
            sequence: sequence.into(),
            count,
        }
    }
}
