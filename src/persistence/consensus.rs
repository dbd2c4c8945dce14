//! Consensus strategy: agree across replicas before trusting a value.
//!
//! Reads poll every replica holding the key until they all report the same
//! bytes. Writes wait until the replicas have settled on some value before
//! overwriting it, and overwrite anyway once the budget is spent. Two
//! concurrent writers can still interleave; the store converges on whichever
//! put lands last.

use super::retry::{RetryDecision, RetryPolicy, Sleeper, ThreadSleeper};
use super::{index_key, scan_index, DataStore, IndexEntry, PathIndex};
use crate::error::StoreError;
use crate::store::{DhtKey, KeyStore};
use crate::types::{PathKey, ReplicaId};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Agreement state of a key across its replicas
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaView {
    /// No replica holds the key
    Absent,
    /// Every replica holds the same bytes
    Agreed(Vec<u8>),
    /// Replicas hold this many distinct values
    Divergent(usize),
}

/// Compare the copies held by each replica
pub fn check_versions(replicas: HashMap<ReplicaId, Vec<u8>>) -> ReplicaView {
    let mut values = replicas.into_values();
    let first = match values.next() {
        Some(v) => v,
        None => return ReplicaView::Absent,
    };
    let mut distinct: Vec<Vec<u8>> = Vec::new();
    for value in values {
        if value != first && !distinct.contains(&value) {
            distinct.push(value);
        }
    }
    if distinct.is_empty() {
        ReplicaView::Agreed(first)
    } else {
        ReplicaView::Divergent(distinct.len() + 1)
    }
}

pub struct ConsensusStore {
    keys: Arc<dyn KeyStore>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ConsensusStore {
    pub fn new(keys: Arc<dyn KeyStore>, policy: RetryPolicy) -> Self {
        Self::with_sleeper(keys, policy, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(
        keys: Arc<dyn KeyStore>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            keys,
            policy,
            sleeper,
        }
    }

    /// Poll replicas until they agree; `Inconsistent` once the budget is spent
    fn read_agreed(&self, key: &DhtKey) -> Result<Option<Vec<u8>>, StoreError> {
        let mut rng = rand::thread_rng();
        let mut attempt = 0;
        loop {
            let view = check_versions(self.keys.get_replicas(key)?);
            let agreed = !matches!(view, ReplicaView::Divergent(_));
            match self.policy.decide(attempt, agreed, rng.gen::<f64>()) {
                RetryDecision::Accept => {
                    return Ok(match view {
                        ReplicaView::Agreed(value) => Some(value),
                        _ => None,
                    })
                }
                RetryDecision::Retry(delay) => {
                    debug!(key = %key, attempt, ?view, ?delay, "Replicas disagree, retrying read");
                    self.sleeper.sleep(delay);
                }
                RetryDecision::GiveUp => {
                    warn!(key = %key, attempts = attempt + 1, "No consensus reached on read");
                    return Err(StoreError::Inconsistent {
                        key: key.to_string(),
                        attempts: attempt + 1,
                    });
                }
            }
            attempt += 1;
        }
    }

    /// Wait for prior writers to settle, then write
    fn write_settled(&self, key: &DhtKey, value: &[u8]) -> Result<(), StoreError> {
        let mut rng = rand::thread_rng();
        let mut attempt = 0;
        loop {
            let view = check_versions(self.keys.get_replicas(key)?);
            let settled = !matches!(view, ReplicaView::Divergent(_));
            match self.policy.decide(attempt, settled, rng.gen::<f64>()) {
                RetryDecision::Accept => break,
                RetryDecision::Retry(delay) => {
                    debug!(key = %key, attempt, ?delay, "Waiting for replicas to settle before write");
                    self.sleeper.sleep(delay);
                }
                RetryDecision::GiveUp => {
                    warn!(
                        key = %key,
                        attempts = attempt + 1,
                        "Replicas never settled, overwriting without consensus"
                    );
                    break;
                }
            }
            attempt += 1;
        }
        self.keys.put(key, value)
    }
}

impl DataStore for ConsensusStore {
    fn get(&self, key: &PathKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.read_agreed(&DhtKey::data(*key))
    }

    fn put(&self, key: &PathKey, value: &[u8]) -> Result<(), StoreError> {
        self.write_settled(&DhtKey::data(*key), value)
    }

    fn remove(&self, key: &PathKey) -> Result<(), StoreError> {
        self.keys.remove(&DhtKey::data(*key))
    }
}

impl PathIndex for ConsensusStore {
    fn get_entry(&self, key: &PathKey) -> Result<Option<IndexEntry>, StoreError> {
        match self.read_agreed(&index_key(key))? {
            Some(bytes) => Ok(Some(IndexEntry::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_entry(&self, key: &PathKey, entry: &IndexEntry) -> Result<(), StoreError> {
        self.write_settled(&index_key(key), &entry.encode()?)
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
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Records requested delays instead of sleeping
    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.delays.lock().push(duration);
        }
    }

    /// Heals a diverged replica after a number of sleeps
    struct HealingSleeper {
        keys: Arc<MemoryKeyStore>,
        key: DhtKey,
        heal_after: usize,
        calls: Mutex<usize>,
    }

    impl Sleeper for HealingSleeper {
        fn sleep(&self, _duration: Duration) {
            let mut calls = self.calls.lock();
            *calls += 1;
            if *calls == self.heal_after {
                self.keys.set_replica(1, &self.key, b"settled");
                self.keys.set_replica(0, &self.key, b"settled");
            }
        }
    }

    #[test]
    fn test_check_versions() {
        assert_eq!(check_versions(HashMap::new()), ReplicaView::Absent);
        let agreed: HashMap<ReplicaId, Vec<u8>> =
            [(0, b"a".to_vec()), (1, b"a".to_vec())].into_iter().collect();
        assert_eq!(check_versions(agreed), ReplicaView::Agreed(b"a".to_vec()));
        let divergent: HashMap<ReplicaId, Vec<u8>> =
            [(0, b"a".to_vec()), (1, b"b".to_vec()), (2, b"b".to_vec())]
                .into_iter()
                .collect();
        assert_eq!(check_versions(divergent), ReplicaView::Divergent(2));
    }

    #[test]
    fn test_agreed_read_returns_value_without_sleeping() {
        let keys = Arc::new(MemoryKeyStore::new(3));
        let sleeper = Arc::new(RecordingSleeper::default());
        let store = ConsensusStore::with_sleeper(keys, RetryPolicy::default(), sleeper.clone());
        let key = path_key("/a.txt");
        store.put(&key, b"hello").unwrap();
        assert_eq!(store.get(&key).unwrap().unwrap(), b"hello");
        assert!(sleeper.delays.lock().is_empty());
    }

    #[test]
    fn test_absent_key_reads_none() {
        let keys = Arc::new(MemoryKeyStore::new(3));
        let store = ConsensusStore::with_sleeper(
            keys,
            RetryPolicy::default(),
            Arc::new(RecordingSleeper::default()),
        );
        assert!(store.get(&path_key("/missing")).unwrap().is_none());
    }

    #[test]
    fn test_divergent_read_is_inconsistent_after_budget() {
        let keys = Arc::new(MemoryKeyStore::new(2));
        let sleeper = Arc::new(RecordingSleeper::default());
        let store = ConsensusStore::with_sleeper(
            keys.clone(),
            RetryPolicy::new(4, 500),
            sleeper.clone(),
        );
        let key = path_key("/a.txt");
        keys.set_replica(0, &DhtKey::data(key), b"left");
        keys.set_replica(1, &DhtKey::data(key), b"right");

        let result = store.get(&key);
        assert!(matches!(
            result,
            Err(StoreError::Inconsistent { attempts: 4, .. })
        ));
        let delays = sleeper.delays.lock();
        assert_eq!(delays.len(), 3);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(500)));
    }

    #[test]
    fn test_divergent_read_converges_when_replicas_heal() {
        let keys = Arc::new(MemoryKeyStore::new(2));
        let key = path_key("/a.txt");
        let dht_key = DhtKey::data(key);
        keys.set_replica(0, &dht_key, b"left");
        keys.set_replica(1, &dht_key, b"right");
        let sleeper = Arc::new(HealingSleeper {
            keys: keys.clone(),
            key: dht_key,
            heal_after: 2,
            calls: Mutex::new(0),
        });
        let store = ConsensusStore::with_sleeper(keys, RetryPolicy::default(), sleeper);
        assert_eq!(store.get(&key).unwrap().unwrap(), b"settled");
    }

    #[test]
    fn test_write_proceeds_after_budget_without_consensus() {
        let keys = Arc::new(MemoryKeyStore::new(2));
        let sleeper = Arc::new(RecordingSleeper::default());
        let store = ConsensusStore::with_sleeper(
            keys.clone(),
            RetryPolicy::new(3, 100),
            sleeper.clone(),
        );
        let key = path_key("/a.txt");
        keys.set_replica(0, &DhtKey::data(key), b"left");
        keys.set_replica(1, &DhtKey::data(key), b"right");

        store.put(&key, b"winner").unwrap();
        assert_eq!(sleeper.delays.lock().len(), 2);
        assert_eq!(store.get(&key).unwrap().unwrap(), b"winner");
    }
}
