//! Filesystem statistics surface.
//!
//! Block counts are a per-peer allowance multiplied by the connected peer
//! count. The numbers are cosmetic, not a capacity guarantee.

use serde::{Deserialize, Serialize};

/// Per-peer statistics allowance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatfsConfig {
    #[serde(default = "default_block_size")]
    pub block_size: u64,

    /// Total blocks contributed by each peer
    #[serde(default = "default_blocks")]
    pub blocks_per_peer: u64,

    /// Free blocks contributed by each peer
    #[serde(default = "default_blocks")]
    pub free_blocks_per_peer: u64,

    #[serde(default = "default_files")]
    pub files: u64,

    #[serde(default = "default_files")]
    pub free_files: u64,

    #[serde(default = "default_name_max")]
    pub name_max: u32,
}

fn default_block_size() -> u64 {
    4096
}

fn default_blocks() -> u64 {
    1 << 20
}

fn default_files() -> u64 {
    1 << 16
}

fn default_name_max() -> u32 {
    255
}

impl Default for StatfsConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            blocks_per_peer: default_blocks(),
            free_blocks_per_peer: default_blocks(),
            files: default_files(),
            free_files: default_files(),
            name_max: default_name_max(),
        }
    }
}

/// Mirrors the fields of `struct statvfs` the binding reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatFs {
    pub bsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub namelen: u32,
}

impl StatfsConfig {
    /// Statistics for `peers` connected peers; zero peers counts as one
    pub fn scaled(&self, peers: usize) -> StatFs {
        let peers = peers.max(1) as u64;
        let free = self.free_blocks_per_peer.min(self.blocks_per_peer);
        StatFs {
            bsize: self.block_size,
            blocks: self.blocks_per_peer.saturating_mul(peers),
            bfree: free.saturating_mul(peers),
            bavail: free.saturating_mul(peers),
            files: self.files,
            ffree: self.free_files.min(self.files),
            namelen: self.name_max,
        }
    }
}
