//! StorageConfig: where the local key store lives.

use crate::config::xdg;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Key store directory; None means `$XDG_DATA_HOME/dhtfs/store`
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the key store directory.
    pub fn resolve_store_path(&self) -> Result<PathBuf, ApiError> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(xdg::data_dir()?.join("store")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_store_path_wins() {
        let config = StorageConfig {
            store_path: Some(PathBuf::from("/srv/dhtfs")),
        };
        assert_eq!(config.resolve_store_path().unwrap(), PathBuf::from("/srv/dhtfs"));
    }

    #[test]
    fn test_default_store_path_under_data_dir() {
        if xdg::data_home().is_none() {
            return;
        }
        let path = StorageConfig::default().resolve_store_path().unwrap();
        assert!(path.ends_with("dhtfs/store"));
    }
}
