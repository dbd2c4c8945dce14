//! In-process replicated key store.
//!
//! Simulates a DHT with a fixed number of replicas. Puts land on every
//! replica; individual replicas can be overwritten to model divergence, and
//! the whole store can be switched offline to model transport failures.

use super::{DhtKey, KeyStore};
use crate::error::StoreError;
use crate::types::{PathKey, ReplicaId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

type Replica = HashMap<DhtKey, Vec<u8>>;

pub struct MemoryKeyStore {
    replicas: RwLock<Vec<Replica>>,
    put_counts: RwLock<HashMap<DhtKey, usize>>,
    offline: AtomicBool,
}

impl MemoryKeyStore {
    /// Create a store with `replica_count` replicas (at least one)
    pub fn new(replica_count: usize) -> Self {
        let count = replica_count.max(1);
        Self {
            replicas: RwLock::new((0..count).map(|_| HashMap::new()).collect()),
            put_counts: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Overwrite one replica's copy without touching the others
    pub fn set_replica(&self, replica: ReplicaId, key: &DhtKey, value: &[u8]) {
        let mut replicas = self.replicas.write();
        if let Some(map) = replicas.get_mut(replica as usize) {
            map.insert(*key, value.to_vec());
        }
    }

    /// Make every subsequent call fail with `Unavailable` (or recover)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful puts issued against `key`
    pub fn put_count(&self, key: &DhtKey) -> usize {
        self.put_counts.read().get(key).copied().unwrap_or(0)
    }

    /// Total number of successful puts across all keys
    pub fn total_puts(&self) -> usize {
        self.put_counts.read().values().sum()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory key store is offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new(1)
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, key: &DhtKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_online()?;
        let replicas = self.replicas.read();
        Ok(replicas.iter().find_map(|r| r.get(key).cloned()))
    }

    fn get_replicas(&self, key: &DhtKey) -> Result<HashMap<ReplicaId, Vec<u8>>, StoreError> {
        self.check_online()?;
        let replicas = self.replicas.read();
        Ok(replicas
            .iter()
            .enumerate()
            .filter_map(|(id, r)| r.get(key).map(|v| (id as ReplicaId, v.clone())))
            .collect())
    }

    fn put(&self, key: &DhtKey, value: &[u8]) -> Result<(), StoreError> {
        self.check_online()?;
        {
            let mut replicas = self.replicas.write();
            for replica in replicas.iter_mut() {
                replica.insert(*key, value.to_vec());
            }
        }
        *self.put_counts.write().entry(*key).or_insert(0) += 1;
        Ok(())
    }

    fn remove(&self, key: &DhtKey) -> Result<(), StoreError> {
        self.check_online()?;
        let mut replicas = self.replicas.write();
        for replica in replicas.iter_mut() {
            replica.remove(key);
        }
        Ok(())
    }

    fn query_all(&self, location: &PathKey) -> Result<HashMap<PathKey, Vec<u8>>, StoreError> {
        self.check_online()?;
        let replicas = self.replicas.read();
        let mut merged = HashMap::new();
        for replica in replicas.iter() {
            for (key, value) in replica.iter().filter(|(k, _)| &k.location == location) {
                merged.entry(key.sub).or_insert_with(|| value.clone());
            }
        }
        Ok(merged)
    }

    fn peer_count(&self) -> usize {
        self.replicas.read().len()
    }
}
