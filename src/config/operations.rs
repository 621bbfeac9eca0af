//! Config loading, validation, and derived settings.

use super::model::Config;
use super::types::DEFAULT_CONFIG_FILE;
use crate::error::{MiglockError, Result};
use crate::locks::MAX_LOCK_TIMEOUT;
use crate::orchestrator::RetryPolicy;
use crate::store::{FileStoreOptions, StorePath};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

impl Config {
    /// Load config from a YAML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(MiglockError::UserError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            MiglockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load the config for a CLI invocation.
    ///
    /// An explicit path must exist. Without one, `miglock.yaml` in `dir` is
    /// used when present and defaults otherwise. Returns the config together
    /// with the directory relative paths resolve against.
    pub fn load_or_default(explicit: Option<&Path>, dir: &Path) -> Result<(Self, PathBuf)> {
        if let Some(path) = explicit {
            let config = Self::load(path)?;
            let base = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => dir.to_path_buf(),
            };
            return Ok((config, base));
        }

        let default_path = dir.join(DEFAULT_CONFIG_FILE);
        if default_path.is_file() {
            return Ok((Self::load(&default_path)?, dir.to_path_buf()));
        }

        debug!(dir = %dir.display(), "no {} found, using defaults", DEFAULT_CONFIG_FILE);
        Ok((Self::default(), dir.to_path_buf()))
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| MiglockError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            MiglockError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `locking.timeout` must be positive
    /// - `store.txn_wait_ms` and `store.txn_stale_ms` must be positive
    /// - `namespace` + `locking.table_name` must form a valid store key
    pub fn validate(&self) -> Result<()> {
        if self.locking.timeout == 0 {
            return Err(MiglockError::UserError(
                "config validation failed: locking.timeout must be greater than 0".to_string(),
            ));
        }

        if self.lock_timeout() > MAX_LOCK_TIMEOUT {
            return Err(MiglockError::UserError(format!(
                "config validation failed: locking.timeout must be at most {} ms",
                MAX_LOCK_TIMEOUT.as_millis()
            )));
        }

        if self.store.txn_wait_ms == 0 {
            return Err(MiglockError::UserError(
                "config validation failed: store.txn_wait_ms must be greater than 0".to_string(),
            ));
        }

        if self.store.txn_stale_ms == 0 {
            return Err(MiglockError::UserError(
                "config validation failed: store.txn_stale_ms must be greater than 0".to_string(),
            ));
        }

        self.lock_path().map_err(|e| {
            MiglockError::UserError(format!("config validation failed: {}", e))
        })?;

        Ok(())
    }

    /// Store key of the lock: `<namespace>/<locking.table_name>`.
    pub fn lock_path(&self) -> Result<StorePath> {
        StorePath::join(&self.namespace, &self.locking.table_name)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.locking.timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.locking.retry_attempts,
            delay: Duration::from_millis(self.locking.retry_delay),
        }
    }

    pub fn file_store_options(&self) -> FileStoreOptions {
        FileStoreOptions {
            txn_wait: Duration::from_millis(self.store.txn_wait_ms),
            txn_stale: Duration::from_millis(self.store.txn_stale_ms),
            ..FileStoreOptions::default()
        }
    }

    /// File store root, resolved against `base` when relative.
    pub fn store_root(&self, base: &Path) -> PathBuf {
        if self.store.root.is_absolute() {
            self.store.root.clone()
        } else {
            base.join(&self.store.root)
        }
    }
}
