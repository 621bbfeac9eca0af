//! Configuration sections and defaults for miglock.
//!
//! Each section is its own struct so a partial YAML file only overrides the
//! keys it names. Keys are snake_case; camelCase aliases are accepted for
//! the locking keys so that existing `locking:` blocks can be reused as-is.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "miglock.yaml";

/// Which [`crate::store::AtomicStore`] backs the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Directory of JSON files, shareable across processes (default).
    #[default]
    File,
    /// In-process map. Only useful for tests and dry runs.
    Memory,
}

/// `store:` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,

    /// Store directory for the file store. Relative paths resolve against the
    /// directory of the config file.
    pub root: PathBuf,

    /// How long a file store transaction waits for a competing guard.
    #[serde(alias = "txnWaitMs")]
    pub txn_wait_ms: u64,

    /// Age after which a file store transaction guard is broken.
    #[serde(alias = "txnStaleMs")]
    pub txn_stale_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            root: default_store_root(),
            txn_wait_ms: default_txn_wait_ms(),
            txn_stale_ms: default_txn_stale_ms(),
        }
    }
}

/// `locking:` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    /// When false, no lock is taken and `run` executes uncoordinated.
    pub enabled: bool,

    /// Lock timeout in milliseconds.
    pub timeout: u64,

    /// Lock location below the namespace.
    #[serde(alias = "tableName")]
    pub table_name: String,

    /// Retries after a contended first attempt.
    #[serde(alias = "retryAttempts")]
    pub retry_attempts: u32,

    /// Milliseconds between attempts.
    #[serde(alias = "retryDelay")]
    pub retry_delay: u64,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            timeout: default_lock_timeout_ms(),
            table_name: default_table_name(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay_ms(),
        }
    }
}

/// `run:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Migration command used by `miglock run` when no argv is given
    /// (shell-words parsed; no shell).
    pub command: String,
}

// Default value functions for serde
pub(crate) fn default_namespace() -> String {
    "default".to_string()
}
pub(crate) fn default_store_root() -> PathBuf {
    PathBuf::from(".miglock/store")
}
pub(crate) fn default_txn_wait_ms() -> u64 {
    5_000
}
pub(crate) fn default_txn_stale_ms() -> u64 {
    30_000
}
pub(crate) fn default_lock_timeout_ms() -> u64 {
    600_000
}
pub(crate) fn default_table_name() -> String {
    "migrations/_lock".to_string()
}
pub(crate) fn default_retry_attempts() -> u32 {
    3
}
pub(crate) fn default_retry_delay_ms() -> u64 {
    1_000
}
pub(crate) fn default_true() -> bool {
    true
}
