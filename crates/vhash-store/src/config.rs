use std::path::Path;

use serde::{Deserialize, Serialize};
use vhash_backend::RedisConfig;
use vhash_protocol::KeyLayout;

use crate::error::{Result, StoreError};

/// Store configuration, loadable from TOML.
///
/// ```toml
/// registry_key = "collections"
/// preload_scripts = true
///
/// [redis]
/// url = "redis://127.0.0.1:6379"
/// io_timeout_ms = 30000
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub redis: RedisConfig,
    /// Key of the set listing every collection name.
    pub registry_key: String,
    /// Load every protocol script when the store opens.
    pub preload_scripts: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            registry_key: KeyLayout::DEFAULT_REGISTRY.to_string(),
            preload_scripts: false,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn key_layout(&self) -> KeyLayout {
        KeyLayout::new(self.registry_key.clone())
    }
}
