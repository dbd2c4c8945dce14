//! Configuration
//!
//! Layered configuration for a dhtfs peer: built-in defaults, the global
//! XDG file, an optional explicit file, and the `DHTFS__*` environment.

mod facade;
mod merge;
mod paths;
mod sources;
mod storage;

pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;
pub use storage::StorageConfig;

use crate::debounce::DebounceConfig;
use crate::logging::LoggingConfig;
use crate::persistence::PersistenceConfig;
use crate::reconcile::ReconcileConfig;
use crate::statfs::StatfsConfig;
use serde::{Deserialize, Serialize};

/// Complete peer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DhtFsConfig {
    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub debounce: DebounceConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub statfs: StatfsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}
