//! Persistence Strategies
//!
//! Read and write the path tree through the key store. Two base strategies
//! talk to the DHT directly ([`DirectStore`], [`ConsensusStore`]); two layers
//! wrap any other strategy ([`ChunkedStore`], [`VersionedStore`]).
//!
//! Every strategy is both a [`DataStore`] (path key -> bytes) and a
//! [`PathIndex`] (path key -> [`IndexEntry`]).

pub mod chunked;
pub mod consensus;
pub mod direct;
pub mod retry;
pub mod versioned;

use crate::error::StoreError;
use crate::store::{DhtKey, KeyStore};
use crate::tree::hasher::index_location;
use crate::types::PathKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

pub use chunked::ChunkedStore;
pub use consensus::ConsensusStore;
pub use direct::DirectStore;
pub use retry::{RetryDecision, RetryPolicy, Sleeper, ThreadSleeper};
pub use versioned::VersionedStore;

/// Path Index value.
///
/// `resolved` equals `path` for directories and files. For a symlink it holds
/// the existing path the link redirects to, which is how a symlink is told
/// apart from a regular node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub path: String,
    pub resolved: String,
}

impl IndexEntry {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            resolved: path.to_string(),
        }
    }

    pub fn redirect(path: &str, resolved: &str) -> Self {
        Self {
            path: path.to_string(),
            resolved: resolved.to_string(),
        }
    }

    pub fn is_symlink(&self) -> bool {
        self.resolved != self.path
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Path key -> byte payload
pub trait DataStore: Send + Sync {
    fn get(&self, key: &PathKey) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, key: &PathKey, value: &[u8]) -> Result<(), StoreError>;
    fn remove(&self, key: &PathKey) -> Result<(), StoreError>;
}

/// Path key -> canonical path (the authoritative list of what exists)
pub trait PathIndex: Send + Sync {
    fn get_entry(&self, key: &PathKey) -> Result<Option<IndexEntry>, StoreError>;
    fn put_entry(&self, key: &PathKey, entry: &IndexEntry) -> Result<(), StoreError>;
    fn remove_entry(&self, key: &PathKey) -> Result<(), StoreError>;
    fn get_all_entries(&self) -> Result<Vec<IndexEntry>, StoreError>;

    fn get_all_paths(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .get_all_entries()?
            .into_iter()
            .map(|entry| entry.path)
            .collect())
    }
}

/// A complete strategy: data plus index
pub trait Persistence: DataStore + PathIndex {}

impl<T: DataStore + PathIndex> Persistence for T {}

/// DHT address of a node's Path Index entry
pub(crate) fn index_key(key: &PathKey) -> DhtKey {
    DhtKey::entry(index_location(), *key)
}

/// Decode every entry under the index location, skipping malformed values
pub(crate) fn scan_index(keys: &dyn KeyStore) -> Result<Vec<IndexEntry>, StoreError> {
    let raw = keys.query_all(&index_location())?;
    let mut entries = BTreeMap::new();
    for (sub, bytes) in raw {
        match IndexEntry::decode(&bytes) {
            Ok(entry) => {
                entries.insert(entry.path.clone(), entry);
            }
            Err(e) => warn!(key = %hex::encode(sub), error = %e, "Skipping malformed index entry"),
        }
    }
    Ok(entries.into_values().collect())
}

/// Base strategy talking to the key store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseStrategy {
    Direct,
    Consensus,
}

/// Optional layer stacked on the base strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyLayer {
    None,
    Chunked,
    Versioned,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_base")]
    pub base: BaseStrategy,

    #[serde(default = "default_layer")]
    pub layer: StrategyLayer,

    /// Chunk size in bytes for the chunked layer
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Snapshots retained per file by the versioned layer
    #[serde(default = "default_max_versions")]
    pub max_versions: usize,

    /// Consensus read/write attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Upper bound of the randomized consensus backoff
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_base() -> BaseStrategy {
    BaseStrategy::Direct
}

fn default_layer() -> StrategyLayer {
    StrategyLayer::None
}

fn default_chunk_size() -> usize {
    4096
}

fn default_max_versions() -> usize {
    5
}

fn default_max_attempts() -> usize {
    10
}

fn default_max_backoff_ms() -> u64 {
    500
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            layer: default_layer(),
            chunk_size: default_chunk_size(),
            max_versions: default_max_versions(),
            max_attempts: default_max_attempts(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl PersistenceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.max_backoff_ms)
    }
}

/// Assemble the configured strategy over a key store
pub fn build(config: &PersistenceConfig, keys: Arc<dyn KeyStore>) -> Arc<dyn Persistence> {
    let base: Arc<dyn Persistence> = match config.base {
        BaseStrategy::Direct => Arc::new(DirectStore::new(keys)),
        BaseStrategy::Consensus => Arc::new(ConsensusStore::new(keys, config.retry_policy())),
    };
    let strategy: Arc<dyn Persistence> = match config.layer {
        StrategyLayer::None => base,
        StrategyLayer::Chunked => Arc::new(ChunkedStore::new(base, config.chunk_size)),
        StrategyLayer::Versioned => Arc::new(VersionedStore::new(base, config.max_versions)),
    };
    info!(
        base = ?config.base,
        layer = ?config.layer,
        "Persistence strategy assembled"
    );
    strategy
}
