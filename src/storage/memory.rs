//! In-memory object store for testing and caching.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{QuiverError, Result};
use crate::storage::traits::{ObjectStore, group_by_separator, validate_key};

/// An in-memory object store.
///
/// Useful for tests and for staging blobs before upload. Finalized blobs are
/// held as `Box<[u8]>` to keep the memory layout tight.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<HashMap<String, HashMap<String, Box<[u8]>>>>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects across all buckets.
    pub fn object_count(&self) -> usize {
        self.buckets.lock().values().map(|b| b.len()).sum()
    }

    /// Total size of all objects in bytes.
    pub fn total_size(&self) -> u64 {
        self.buckets
            .lock()
            .values()
            .flat_map(|bucket| bucket.values())
            .map(|data| data.len() as u64)
            .sum()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        validate_key(key)?;
        let mut buckets = self.buckets.lock();
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec().into_boxed_slice());
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;
        let buckets = self.buckets.lock();
        buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|data| data.to_vec())
            .ok_or_else(|| QuiverError::not_found(format!("object {bucket}/{key}")))
    }

    fn get_range(&self, bucket: &str, key: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        if end < start {
            return Err(QuiverError::invalid_argument(format!(
                "invalid range: [{start}, {end})"
            )));
        }
        let data = self.get(bucket, key)?;
        let start = (start as usize).min(data.len());
        let end = (end as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    fn stat(&self, bucket: &str, key: &str) -> Result<u64> {
        validate_key(key)?;
        let buckets = self.buckets.lock();
        buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|data| data.len() as u64)
            .ok_or_else(|| QuiverError::not_found(format!("object {bucket}/{key}")))
    }

    fn list(&self, bucket: &str, prefix: &str, recursive: bool) -> Result<Vec<String>> {
        let buckets = self.buckets.lock();
        let keys: Vec<String> = buckets
            .get(bucket)
            .map(|b| {
                b.keys()
                    .filter(|key| key.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if recursive {
            let mut keys = keys;
            keys.sort();
            Ok(keys)
        } else {
            Ok(group_by_separator(keys, prefix))
        }
    }

    fn remove(&self, bucket: &str, key: &str) -> Result<()> {
        validate_key(key)?;
        let mut buckets = self.buckets.lock();
        if let Some(b) = buckets.get_mut(bucket) {
            b.remove(key);
        }
        Ok(())
    }

    fn remove_bucket(&self, bucket: &str) -> Result<()> {
        self.buckets.lock().remove(bucket);
        Ok(())
    }
}
