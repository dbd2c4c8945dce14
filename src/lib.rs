//! dhtfs: a path-addressable file hierarchy over a distributed hash table
//!
//! Every file, directory, and symlink is stored under the hash of its full
//! path. A Path Index records which paths exist so independent peers can
//! rebuild the same tree. Writes are debounced, persistence strategies are
//! pluggable, and a reconciliation loop keeps peers converging.

pub mod background;
pub mod cli;
pub mod config;
pub mod debounce;
pub mod error;
pub mod fs;
pub mod logging;
pub mod persistence;
pub mod reconcile;
pub mod statfs;
pub mod store;
pub mod tree;
pub mod types;

pub use error::{ApiError, FsError, StoreError};
pub use fs::{DhtFs, OpReply};
