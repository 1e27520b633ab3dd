//! Local-disk object store.
//!
//! Buckets map to directories under a root path and keys to relative file
//! paths below them. Intended for single-node deployments and tests; the
//! durability story is whatever the local filesystem provides.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{QuiverError, Result};
use crate::storage::traits::{KEY_SEPARATOR, ObjectStore, group_by_separator, validate_key};

/// An object store backed by a local directory tree.
#[derive(Debug)]
pub struct LocalDiskObjectStore {
    root: PathBuf,
}

impl LocalDiskObjectStore {
    /// Create a store rooted at the given directory, creating it if absent.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                QuiverError::storage(format!("failed to create root directory: {e}"))
            })?;
        }
        if !root.is_dir() {
            return Err(QuiverError::storage(format!(
                "path is not a directory: {}",
                root.display()
            )));
        }

        Ok(Self { root })
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.root.join(bucket);
        for part in key.split(KEY_SEPARATOR).filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    fn map_not_found(bucket: &str, key: &str, e: std::io::Error) -> QuiverError {
        if e.kind() == std::io::ErrorKind::NotFound {
            QuiverError::not_found(format!("object {bucket}/{key}"))
        } else {
            QuiverError::Io(e)
        }
    }

    fn collect_keys(dir: &Path, base: &Path, keys: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::collect_keys(&path, base, keys)?;
            } else if let Ok(rel) = path.strip_prefix(base) {
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(&KEY_SEPARATOR.to_string());
                keys.push(key);
            }
        }
        Ok(())
    }
}

impl ObjectStore for LocalDiskObjectStore {
    fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        validate_key(key)?;
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;
        fs::read(self.object_path(bucket, key)).map_err(|e| Self::map_not_found(bucket, key, e))
    }

    fn get_range(&self, bucket: &str, key: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        if end < start {
            return Err(QuiverError::invalid_argument(format!(
                "invalid range: [{start}, {end})"
            )));
        }
        validate_key(key)?;

        let path = self.object_path(bucket, key);
        let mut file =
            fs::File::open(&path).map_err(|e| Self::map_not_found(bucket, key, e))?;
        let size = file.metadata()?.len();
        let start = start.min(size);
        let end = end.min(size);

        file.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn stat(&self, bucket: &str, key: &str) -> Result<u64> {
        validate_key(key)?;
        let metadata = fs::metadata(self.object_path(bucket, key))
            .map_err(|e| Self::map_not_found(bucket, key, e))?;
        Ok(metadata.len())
    }

    fn list(&self, bucket: &str, prefix: &str, recursive: bool) -> Result<Vec<String>> {
        let base = self.root.join(bucket);
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        Self::collect_keys(&base, &base, &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));

        if recursive {
            keys.sort();
            Ok(keys)
        } else {
            Ok(group_by_separator(keys, prefix))
        }
    }

    fn remove(&self, bucket: &str, key: &str) -> Result<()> {
        validate_key(key)?;
        match fs::remove_file(self.object_path(bucket, key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_bucket(&self, bucket: &str) -> Result<()> {
        let path = self.root.join(bucket);
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalDiskObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskObjectStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (_dir, store) = store();
        store.put("bucket", "delta/seg-1/0001", b"payload").unwrap();

        assert_eq!(store.get("bucket", "delta/seg-1/0001").unwrap(), b"payload");
        assert_eq!(store.stat("bucket", "delta/seg-1/0001").unwrap(), 7);
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let (_dir, store) = store();
        match store.get("bucket", "nope") {
            Err(QuiverError::NotFound(_)) => {}
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_key_is_invalid_argument() {
        let (_dir, store) = store();
        match store.get("bucket", "/") {
            Err(QuiverError::InvalidArgument(_)) => {}
            other => panic!("expected invalid argument, got {other:?}"),
        }
    }

    #[test]
    fn test_get_range() {
        let (_dir, store) = store();
        store.put("bucket", "k", b"0123456789").unwrap();

        assert_eq!(store.get_range("bucket", "k", 2, 5).unwrap(), b"234");
        assert_eq!(store.get_range("bucket", "k", 8, 100).unwrap(), b"89");
    }

    #[test]
    fn test_list_grouping_matches_memory_backend() {
        let (_dir, store) = store();
        store.put("bucket", "delta/seg-1/0001", b"x").unwrap();
        store.put("bucket", "delta/seg-1/0002", b"x").unwrap();
        store.put("bucket", "delta/seg-2/0001", b"x").unwrap();

        let all = store.list("bucket", "delta/", true).unwrap();
        assert_eq!(all.len(), 3);

        let grouped = store.list("bucket", "delta/", false).unwrap();
        assert_eq!(
            grouped,
            vec!["delta/seg-1/".to_string(), "delta/seg-2/".to_string()]
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (_dir, store) = store();
        store.put("bucket", "k", b"x").unwrap();
        store.remove("bucket", "k").unwrap();
        store.remove("bucket", "k").unwrap();
        assert!(store.get("bucket", "k").is_err());
    }

    #[test]
    fn test_remove_bucket() {
        let (_dir, store) = store();
        store.put("bucket", "a/b", b"x").unwrap();
        store.remove_bucket("bucket").unwrap();
        assert!(store.list("bucket", "", true).unwrap().is_empty());
        // Missing bucket is fine.
        store.remove_bucket("bucket").unwrap();
    }
}
