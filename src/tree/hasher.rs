//! Hash computation for DHT location and content keys

use crate::types::{PathKey, MASTER_INDEX_KEY};

/// Truncate a BLAKE3 digest to the 160-bit keyspace
fn truncate(hash: blake3::Hash) -> PathKey {
    let mut key = [0u8; 20];
    key.copy_from_slice(&hash.as_bytes()[..20]);
    key
}

/// Compute the location key for a full path
///
/// The path is hashed as given; callers normalize it first so that
/// `/a/b` and `/a//b/` address the same entry.
pub fn path_key(path: &str) -> PathKey {
    truncate(blake3::hash(path.as_bytes()))
}

/// Compute the content-addressed key for a byte payload
pub fn content_key(bytes: &[u8]) -> PathKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"chunk:");
    hasher.update(bytes);
    truncate(hasher.finalize())
}

/// Location key under which every Path Index entry lives
pub fn index_location() -> PathKey {
    path_key(MASTER_INDEX_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_key_is_deterministic() {
        assert_eq!(path_key("/a/report.txt"), path_key("/a/report.txt"));
        assert_ne!(path_key("/a/report.txt"), path_key("/a/report.md"));
    }

    #[test]
    fn test_content_key_differs_from_path_key() {
        assert_ne!(content_key(b"/a"), path_key("/a"));
        assert_eq!(content_key(b"hello"), content_key(b"hello"));
    }
}
