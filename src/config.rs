//! JSON configuration for the hashing service. Every field is optional and
//! falls back to cost 10 and `/dev/urandom`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::crypto::entropy::{TieredEntropy, DEFAULT_DEVICE_PATH};
use crate::crypto::primitive::BcryptPrimitive;
use crate::crypto::service::{HashingService, DEFAULT_COST};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Io(String),
    #[error("config parse failed: {0}")]
    Parse(String),
    #[error("invalid hashing settings: {0}")]
    Hashing(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashingConfig {
    #[serde(default = "default_cost")]
    pub cost: u32,
    /// Device read by the second entropy tier.
    #[serde(default = "default_entropy_device")]
    pub entropy_device: PathBuf,
    /// Tracing filter applied when `RUST_LOG` is not set.
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_cost() -> u32 {
    DEFAULT_COST
}

fn default_entropy_device() -> PathBuf {
    PathBuf::from(DEFAULT_DEVICE_PATH)
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            cost: default_cost(),
            entropy_device: default_entropy_device(),
            log_level: None,
        }
    }
}

impl HashingConfig {
    /// Builds a service whose device tier reads from `entropy_device`.
    pub fn build_service(&self) -> Result<HashingService, ConfigError> {
        HashingService::with_parts(
            self.cost,
            TieredEntropy::with_device(&self.entropy_device),
            Box::new(BcryptPrimitive),
        )
        .map_err(|e| ConfigError::Hashing(format!("{e}")))
    }
}

/// Reads the JSON configuration file without validating the hashing
/// settings, so callers can apply overrides first.
pub fn read_config(path: impl AsRef<Path>) -> Result<HashingConfig, ConfigError> {
    let raw_json = fs::read_to_string(&path).map_err(|e| ConfigError::Io(format!("{e}")))?;
    serde_json::from_str(&raw_json).map_err(|e| ConfigError::Parse(format!("{e}")))
}

/// Loads and validates the JSON configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<HashingConfig, ConfigError> {
    let config = read_config(path)?;

    // Surface a bad cost at load time rather than on first use.
    config.build_service()?;
    Ok(config)
}
