//! In-memory [`BlobStore`] that records every call and can be told to fail.

use crate::storage::encoder::{Base64DataEncoder, DataEncoder};
use crate::storage::{BlobStore, BlobStoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
    saved_paths: Mutex<Vec<String>>,
    deleted_keys: Mutex<Vec<String>>,
    save_calls: AtomicUsize,
    thumbnail_calls: AtomicUsize,
    fail_saves: AtomicBool,
    fail_thumbnails: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_thumbnails(&self, fail: bool) {
        self.fail_thumbnails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Blobs currently stored
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.get(key).map(|entry| entry.value().clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Storage paths of every successful save, thumbnails included, in call order
    pub fn saved_paths(&self) -> Vec<String> {
        self.saved_paths.lock().clone()
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted_keys.lock().clone()
    }

    /// Calls to `save`, successful or not
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Calls to `save_thumbnail`, successful or not
    pub fn thumbnail_calls(&self) -> usize {
        self.thumbnail_calls.load(Ordering::SeqCst)
    }

    /// Total calls of any kind
    pub fn total_calls(&self) -> usize {
        self.save_calls() + self.thumbnail_calls() + self.deleted_keys.lock().len()
    }

    fn put(&self, path: &str, data: &[u8]) -> String {
        let key = Base64DataEncoder.encode(path);
        self.blobs.insert(key.clone(), data.to_vec());
        self.saved_paths.lock().push(path.to_string());
        key
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(&self, path: &str, data: &[u8]) -> Result<String, BlobStoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(BlobStoreError::unavailable("memory store rejecting saves"));
        }
        Ok(self.put(path, data))
    }

    async fn save_thumbnail(&self, path: &str, data: &[u8]) -> Result<String, BlobStoreError> {
        self.thumbnail_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_thumbnails.load(Ordering::SeqCst) {
            return Err(BlobStoreError::thumbnail(path, "memory store rejecting thumbnails"));
        }
        Ok(self.put(path, data))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobStoreError::unavailable("memory store rejecting deletes"));
        }
        self.deleted_keys.lock().push(key.to_string());
        self.blobs.remove(key);
        Ok(())
    }
}
