//! MergeService: orchestrates sources, applies merge policy, deserializes to DhtFsConfig.

use crate::config::sources::{environment, explicit_file, global_file};
use crate::config::DhtFsConfig;
use config::ConfigError;
use std::path::Path;
use tracing::debug;

use super::merge_policy;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Precedence: defaults (lowest) -> global file -> explicit file -> environment (highest).
    pub fn load(explicit: Option<&Path>) -> Result<DhtFsConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = match explicit {
            Some(path) => explicit_file::add_to_builder(builder, path)?,
            None => builder,
        };
        let builder = environment::add_to_builder(builder)?;

        let config: DhtFsConfig = builder.build()?.try_deserialize()?;
        debug!(
            base = ?config.persistence.base,
            layer = ?config.persistence.layer,
            debounce = config.debounce.enabled,
            "Configuration loaded"
        );
        Ok(config)
    }
}
