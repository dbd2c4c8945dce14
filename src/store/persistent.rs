//! Single-peer key store persisted with sled.
//!
//! Stands in for the DHT when running one peer locally: there is exactly
//! one replica, so consensus reads agree trivially.

use super::{DhtKey, KeyStore};
use crate::error::StoreError;
use crate::types::{PathKey, ReplicaId};
use std::collections::HashMap;
use std::path::Path;

pub struct SledKeyStore {
    db: sled::Db,
}

impl SledKeyStore {
    /// Open (or create) a store at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Temporary store that is deleted on drop
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl KeyStore for SledKeyStore {
    fn get(&self, key: &DhtKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key.to_bytes())?.map(|v| v.to_vec()))
    }

    fn get_replicas(&self, key: &DhtKey) -> Result<HashMap<ReplicaId, Vec<u8>>, StoreError> {
        let mut replicas = HashMap::new();
        if let Some(value) = self.get(key)? {
            replicas.insert(0, value);
        }
        Ok(replicas)
    }

    fn put(&self, key: &DhtKey, value: &[u8]) -> Result<(), StoreError> {
        self.db.insert(key.to_bytes(), value)?;
        Ok(())
    }

    fn remove(&self, key: &DhtKey) -> Result<(), StoreError> {
        self.db.remove(key.to_bytes())?;
        Ok(())
    }

    fn query_all(&self, location: &PathKey) -> Result<HashMap<PathKey, Vec<u8>>, StoreError> {
        let mut entries = HashMap::new();
        for item in self.db.scan_prefix(location) {
            let (raw_key, value) = item?;
            if let Some(key) = DhtKey::from_bytes(&raw_key) {
                entries.insert(key.sub, value.to_vec());
            }
        }
        Ok(entries)
    }
}
