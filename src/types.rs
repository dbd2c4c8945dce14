//! Core types for the DHT-backed file hierarchy.

/// PathKey: 160-bit DHT location key derived from a full path string
pub type PathKey = [u8; 20];

/// Identifier of a replica holding a copy of a key
pub type ReplicaId = u32;

/// Name of the key under which the global Path Index is stored
pub const MASTER_INDEX_KEY: &str = "__dhtfs_master_index__";

/// Root of every hierarchy
pub const ROOT_PATH: &str = "/";
