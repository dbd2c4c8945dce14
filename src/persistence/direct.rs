//! Direct strategy: one key store round trip per operation, last write wins.

use super::{index_key, scan_index, DataStore, IndexEntry, PathIndex};
use crate::error::StoreError;
use crate::store::{DhtKey, KeyStore};
use crate::types::PathKey;
use std::sync::Arc;

pub struct DirectStore {
    keys: Arc<dyn KeyStore>,
}

impl DirectStore {
    pub fn new(keys: Arc<dyn KeyStore>) -> Self {
        Self { keys }
    }
}

impl DataStore for DirectStore {
    fn get(&self, key: &PathKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.keys.get(&DhtKey::data(*key))
    }

    fn put(&self, key: &PathKey, value: &[u8]) -> Result<(), StoreError> {
        self.keys.put(&DhtKey::data(*key), value)
    }

    fn remove(&self, key: &PathKey) -> Result<(), StoreError> {
        self.keys.remove(&DhtKey::data(*key))
    }
}

impl PathIndex for DirectStore {
    fn get_entry(&self, key: &PathKey) -> Result<Option<IndexEntry>, StoreError> {
        match self.keys.get(&index_key(key))? {
            Some(bytes) => Ok(Some(IndexEntry::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_entry(&self, key: &PathKey, entry: &IndexEntry) -> Result<(), StoreError> {
        self.keys.put(&index_key(key), &entry.encode()?)
    }

    fn remove_entry(&self, key: &PathKey) -> Result<(), StoreError> {
        self.keys.remove(&index_key(key))
    }

    fn get_all_entries(&self) -> Result<Vec<IndexEntry>, StoreError> {
        scan_index(self.keys.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKeyStore;
    use crate::tree::hasher::path_key;

    #[test]
    fn test_last_write_wins() {
        let store = DirectStore::new(Arc::new(MemoryKeyStore::new(1)));
        let key = path_key("/a.txt");
        store.put(&key, b"one").unwrap();
        store.put(&key, b"two").unwrap();
        assert_eq!(store.get(&key).unwrap().unwrap(), b"two");
        store.remove(&key).unwrap();
        assert!(store.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_index_entries_listed() {
        let store = DirectStore::new(Arc::new(MemoryKeyStore::new(1)));
        store.put_entry(&path_key("/a"), &IndexEntry::new("/a")).unwrap();
        store.put_entry(&path_key("/a/b.txt"), &IndexEntry::new("/a/b.txt")).unwrap();
        let paths = store.get_all_paths().unwrap();
        assert_eq!(paths.len(), 2);
        store.remove_entry(&path_key("/a")).unwrap();
        assert!(!store.get_all_paths().unwrap().contains("/a"));
    }

    #[test]
    fn test_unavailable_propagates() {
        let keys = Arc::new(MemoryKeyStore::new(1));
        let store = DirectStore::new(keys.clone());
        keys.set_offline(true);
        assert!(matches!(
            store.get(&path_key("/a")),
            Err(StoreError::Unavailable(_))
        ));
    }
}
