//! Configuration model for miglock.
//!
//! This module defines the Config struct that represents `miglock.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! defaults for every key, and validation of config values.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use types::{DEFAULT_CONFIG_FILE, LockingConfig, RunConfig, StoreConfig, StoreKind};
