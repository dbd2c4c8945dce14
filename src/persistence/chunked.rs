//! Chunked layer: content-addressed fixed-size chunks.
//!
//! A payload is split into `chunk_size` pieces, each stored under the hash
//! of its own bytes, so identical chunks across files collapse into one DHT
//! entry. The primary key holds only the ordered manifest of chunk hashes.

use super::{DataStore, IndexEntry, PathIndex, Persistence};
use crate::error::StoreError;
use crate::tree::hasher::content_key;
use crate::types::PathKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Ordered list of chunk hashes stored under the primary key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub len: u64,
    pub chunks: Vec<PathKey>,
}

/// Split a payload into its manifest and `(hash, bytes)` chunks
pub fn chunk(payload: &[u8], chunk_size: usize) -> (ChunkManifest, Vec<(PathKey, Vec<u8>)>) {
    let pieces: Vec<(PathKey, Vec<u8>)> = payload
        .chunks(chunk_size.max(1))
        .map(|piece| (content_key(piece), piece.to_vec()))
        .collect();
    let manifest = ChunkManifest {
        len: payload.len() as u64,
        chunks: pieces.iter().map(|(key, _)| *key).collect(),
    };
    (manifest, pieces)
}

/// Reassemble a payload, resolving each chunk through `lookup`
pub fn dechunk<F>(manifest: &ChunkManifest, mut lookup: F) -> Result<Vec<u8>, StoreError>
where
    F: FnMut(&PathKey) -> Result<Option<Vec<u8>>, StoreError>,
{
    let mut payload = Vec::new();
    for chunk_key in &manifest.chunks {
        let piece = lookup(chunk_key)?.ok_or_else(|| StoreError::MissingChunk {
            key: String::new(),
            chunk: hex::encode(chunk_key),
        })?;
        payload.extend_from_slice(&piece);
    }
    if payload.len() as u64 != manifest.len {
        return Err(StoreError::Serialization(format!(
            "reassembled {} bytes, manifest declares {}",
            payload.len(),
            manifest.len
        )));
    }
    Ok(payload)
}

pub struct ChunkedStore {
    inner: Arc<dyn Persistence>,
    chunk_size: usize,
}

impl ChunkedStore {
    pub fn new(inner: Arc<dyn Persistence>, chunk_size: usize) -> Self {
        Self {
            inner,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl DataStore for ChunkedStore {
    fn get(&self, key: &PathKey) -> Result<Option<Vec<u8>>, StoreError> {
        let raw = match self.inner.get(key)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let manifest: ChunkManifest = bincode::deserialize(&raw)?;
        let payload = dechunk(&manifest, |chunk_key| self.inner.get(chunk_key)).map_err(
            |e| match e {
                StoreError::MissingChunk { chunk, .. } => StoreError::MissingChunk {
                    key: hex::encode(key),
                    chunk,
                },
                other => other,
            },
        )?;
        Ok(Some(payload))
    }

    fn put(&self, key: &PathKey, value: &[u8]) -> Result<(), StoreError> {
        let (manifest, pieces) = chunk(value, self.chunk_size);
        for (chunk_key, bytes) in &pieces {
            self.inner.put(chunk_key, bytes)?;
        }
        debug!(
            key = %hex::encode(key),
            chunks = pieces.len(),
            len = value.len(),
            "Stored chunked payload"
        );
        self.inner.put(key, &bincode::serialize(&manifest)?)
    }

    /// Removes the manifest only; chunks may be shared with other payloads
    fn remove(&self, key: &PathKey) -> Result<(), StoreError> {
        self.inner.remove(key)
    }
}

impl PathIndex for ChunkedStore {
    fn get_entry(&self, key: &PathKey) -> Result<Option<IndexEntry>, StoreError> {
        self.inner.get_entry(key)
    }

    fn put_entry(&self, key: &PathKey, entry: &IndexEntry) -> Result<(), StoreError> {
        self.inner.put_entry(key, entry)
    }

    fn remove_entry(&self, key: &PathKey) -> Result<(), StoreError> {
        self.inner.remove_entry(key)
    }

    fn get_all_entries(&self) -> Result<Vec<IndexEntry>, StoreError> {
        self.inner.get_all_entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::DirectStore;
    use crate::store::{DhtKey, KeyStore, MemoryKeyStore};
    use crate::tree::hasher::path_key;
    use proptest::prelude::*;

    fn chunked(chunk_size: usize) -> (Arc<MemoryKeyStore>, ChunkedStore) {
        let keys = Arc::new(MemoryKeyStore::new(1));
        let store = ChunkedStore::new(Arc::new(DirectStore::new(keys.clone())), chunk_size);
        (keys, store)
    }

    proptest! {
        #[test]
        fn prop_dechunk_inverts_chunk(payload in proptest::collection::vec(any::<u8>(), 0..20_000)) {
            let (manifest, pieces) = chunk(&payload, 4096);
            let restored = dechunk(&manifest, |k| {
                Ok(pieces.iter().find(|(pk, _)| pk == k).map(|(_, b)| b.clone()))
            }).unwrap();
            prop_assert_eq!(restored, payload);
        }
    }

    #[test]
    fn test_sizes_around_chunk_boundaries() {
        let (_, store) = chunked(16);
        let key = path_key("/a.bin");
        for len in [0usize, 1, 15, 16, 17, 32, 33, 100] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            store.put(&key, &payload).unwrap();
            assert_eq!(store.get(&key).unwrap().unwrap(), payload, "len {}", len);
        }
    }

    #[test]
    fn test_identical_chunks_share_one_entry() {
        let (keys, store) = chunked(4);
        store.put(&path_key("/a.bin"), b"abcdabcd").unwrap();
        store.put(&path_key("/b.bin"), b"abcd").unwrap();
        let shared = DhtKey::data(content_key(b"abcd"));
        assert_eq!(keys.get_replicas(&shared).unwrap().len(), 1);
        assert_eq!(keys.put_count(&shared), 3);
    }

    #[test]
    fn test_missing_chunk_is_hard_failure() {
        let (keys, store) = chunked(4);
        let key = path_key("/a.bin");
        store.put(&key, b"abcdefgh").unwrap();
        keys.remove(&DhtKey::data(content_key(b"efgh"))).unwrap();
        assert!(matches!(
            store.get(&key),
            Err(StoreError::MissingChunk { .. })
        ));
    }

    #[test]
    fn test_oversized_manifest_length_is_rejected() {
        let manifest = ChunkManifest {
            len: u64::MAX,
            chunks: vec![content_key(b"abcd")],
        };
        let result = dechunk(&manifest, |_| Ok(Some(b"abcd".to_vec())));
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
