//! Merge policy: the default layer every load starts from.

use crate::config::DhtFsConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with the serialized defaults; later sources override keys.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&DhtFsConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
