//! Key Store
//!
//! Contract around the external DHT: a replicated keyspace addressed by a
//! (location, sub-key) pair. The raw transport, peer discovery, and replica
//! placement live outside this crate; everything above this module talks to
//! the DHT only through [`KeyStore`].

pub mod memory;
pub mod persistent;

use crate::error::StoreError;
use crate::types::{PathKey, ReplicaId};
use std::collections::HashMap;
use std::fmt;

pub use memory::MemoryKeyStore;
pub use persistent::SledKeyStore;

/// Sub-key used for plain data entries
pub const ZERO_KEY: PathKey = [0u8; 20];

/// Two-level DHT address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DhtKey {
    pub location: PathKey,
    pub sub: PathKey,
}

impl DhtKey {
    /// Address of a plain data entry
    pub fn data(location: PathKey) -> Self {
        Self {
            location,
            sub: ZERO_KEY,
        }
    }

    /// Address of an entry under a shared location (e.g. the Path Index)
    pub fn entry(location: PathKey, sub: PathKey) -> Self {
        Self { location, sub }
    }

    /// Flattened byte form, location first so entries sharing a location are contiguous
    pub fn to_bytes(&self) -> [u8; 40] {
        let mut bytes = [0u8; 40];
        bytes[..20].copy_from_slice(&self.location);
        bytes[20..].copy_from_slice(&self.sub);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 40 {
            return None;
        }
        let mut location = [0u8; 20];
        let mut sub = [0u8; 20];
        location.copy_from_slice(&bytes[..20]);
        sub.copy_from_slice(&bytes[20..]);
        Some(Self { location, sub })
    }
}

impl fmt::Display for DhtKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sub == ZERO_KEY {
            write!(f, "{}", hex::encode(self.location))
        } else {
            write!(f, "{}/{}", hex::encode(self.location), hex::encode(self.sub))
        }
    }
}

/// DHT primitives consumed by the persistence strategies.
///
/// Every call is a blocking round trip bounded by the transport's own
/// timeout; a timeout surfaces as [`StoreError::Unavailable`].
pub trait KeyStore: Send + Sync {
    /// Value as seen by the closest replica
    fn get(&self, key: &DhtKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Value as seen by every replica that currently holds the key
    fn get_replicas(&self, key: &DhtKey) -> Result<HashMap<ReplicaId, Vec<u8>>, StoreError>;

    fn put(&self, key: &DhtKey, value: &[u8]) -> Result<(), StoreError>;

    fn remove(&self, key: &DhtKey) -> Result<(), StoreError>;

    /// All sub-key entries stored under a location
    fn query_all(&self, location: &PathKey) -> Result<HashMap<PathKey, Vec<u8>>, StoreError>;

    /// Number of peers currently reachable, used for cosmetic capacity scaling
    fn peer_count(&self) -> usize {
        1
    }
}
