//! Object storage abstraction trait and common types.
//!
//! Segments never talk to storage mid-operation; delta and insert blobs are
//! hydrated through this interface before the segment layer is invoked.
//! Backends are pluggable: in-memory and local disk ship here, remote
//! S3-compatible and Azure backends live behind the same trait elsewhere.

use crate::error::{QuiverError, Result};

/// Path separator inside object keys.
pub const KEY_SEPARATOR: char = '/';

/// A durable store of opaque byte blobs, addressed by bucket and key.
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Store a blob, overwriting any existing object under the key.
    /// Idempotent.
    fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()>;

    /// Fetch a whole blob. Fails with `NotFound` for a missing key.
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Fetch the byte range `[start, end)` of a blob.
    fn get_range(&self, bucket: &str, key: &str, start: u64, end: u64) -> Result<Vec<u8>>;

    /// Size of a blob in bytes. Fails with `NotFound` if absent.
    fn stat(&self, bucket: &str, key: &str) -> Result<u64>;

    /// List keys under a prefix.
    ///
    /// With `recursive` set, yields every matching leaf key. Otherwise keys
    /// are grouped by the next path separator after the prefix, yielding
    /// "directory-like" prefixes (with a trailing separator) alongside any
    /// direct leaf keys.
    fn list(&self, bucket: &str, prefix: &str, recursive: bool) -> Result<Vec<String>>;

    /// Remove a blob. Removing a missing key is not an error.
    fn remove(&self, bucket: &str, key: &str) -> Result<()>;

    /// Remove a bucket and everything in it.
    fn remove_bucket(&self, bucket: &str) -> Result<()>;
}

/// Reject keys the backends cannot address: empty keys and bare separators.
pub fn validate_key(key: &str) -> Result<()> {
    let trimmed = key.trim_matches(KEY_SEPARATOR);
    if key.is_empty() || trimmed.is_empty() {
        return Err(QuiverError::invalid_argument(format!(
            "malformed object key: {key:?}"
        )));
    }
    Ok(())
}

/// Group leaf keys the way a non-recursive list does: keys with a separator
/// past the prefix collapse into their next path component.
pub fn group_by_separator(keys: impl IntoIterator<Item = String>, prefix: &str) -> Vec<String> {
    let mut grouped = Vec::new();
    for key in keys {
        let rest = &key[prefix.len()..];
        match rest.find(KEY_SEPARATOR) {
            Some(idx) => {
                let dir = format!("{}{}{}", prefix, &rest[..idx], KEY_SEPARATOR);
                if !grouped.contains(&dir) {
                    grouped.push(dir);
                }
            }
            None => {
                if !grouped.contains(&key) {
                    grouped.push(key);
                }
            }
        }
    }
    grouped.sort();
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("a/b/c").is_ok());
        assert!(validate_key("leaf").is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key("/").is_err());
        assert!(validate_key("//").is_err());
    }

    #[test]
    fn test_group_by_separator() {
        let keys = vec![
            "delta/seg-1/0001".to_string(),
            "delta/seg-1/0002".to_string(),
            "delta/seg-2/0001".to_string(),
            "delta/manifest".to_string(),
        ];
        let grouped = group_by_separator(keys, "delta/");
        assert_eq!(
            grouped,
            vec![
                "delta/manifest".to_string(),
                "delta/seg-1/".to_string(),
                "delta/seg-2/".to_string(),
            ]
        );
    }
}
