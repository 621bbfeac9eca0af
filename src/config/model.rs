//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for miglock.
///
/// This struct represents the contents of `miglock.yaml`. Unknown fields in
/// the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix of every store key, usually one per environment.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub locking: LockingConfig,

    #[serde(default)]
    pub run: RunConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            store: StoreConfig::default(),
            locking: LockingConfig::default(),
            run: RunConfig::default(),
        }
    }
}
