//! Command implementations for miglock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, and the shared setup every command needs: config, store
//! and owner id.

mod lock;
mod run;


use crate::cli::{Command, GlobalArgs};
use crate::config::{Config, StoreKind};
use crate::error::{MiglockError, Result};
use crate::locks::{LockingService, configured_owner_id, resolve_owner_id};
use crate::orchestrator::Orchestrator;
use crate::store::{AtomicStore, FileStore, MemoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. Config is loaded
/// relative to the current working directory.
pub fn dispatch(global: GlobalArgs, command: Command) -> Result<()> {
    let cwd = std::env::current_dir().map_err(|e| {
        MiglockError::UserError(format!("failed to read current directory: {}", e))
    })?;
    let ctx = CommandContext::load(&global, &cwd)?;

    match command {
        Command::LockStatus(args) => lock::cmd_lock_status(&ctx, args),
        Command::LockRelease(args) => lock::cmd_lock_release(&ctx, args),
        Command::Run(args) => run::cmd_run(&ctx, args),
    }
}

/// Everything a command needs, resolved once per invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: Config,

    /// Directory that relative config paths resolve against.
    pub base_dir: PathBuf,

    /// `--owner`, if given.
    pub owner: Option<String>,
}

impl CommandContext {
    /// Load the config named by `--config` (or the default file in `dir`).
    pub fn load(global: &GlobalArgs, dir: &Path) -> Result<Self> {
        let (config, base_dir) = Config::load_or_default(global.config.as_deref(), dir)?;
        debug!(
            namespace = %config.namespace,
            store = ?config.store.kind,
            base_dir = %base_dir.display(),
            "loaded config"
        );

        Ok(Self {
            config,
            base_dir,
            owner: global.owner.clone(),
        })
    }

    /// Owner id for this invocation.
    pub fn owner_id(&self) -> Result<String> {
        resolve_owner_id(self.owner.as_deref())
    }

    /// Owner id from `--owner` or `MIGLOCK_OWNER_ID`, never generated.
    ///
    /// Commands that act on an existing lock need this: a freshly generated
    /// id cannot match any holder.
    pub fn explicit_owner_id(&self, command: &str) -> Result<String> {
        configured_owner_id(self.owner.as_deref())?.ok_or_else(|| {
            MiglockError::UserError(format!(
                "{} needs an owner id.\n\n\
                 Fix: pass --owner <id> or set MIGLOCK_OWNER_ID, or use --force to release \
                 regardless of owner.",
                command
            ))
        })
    }

    /// Open the configured store.
    pub fn open_store(&self) -> Result<Arc<dyn AtomicStore>> {
        match self.config.store.kind {
            StoreKind::File => {
                let root = self.config.store_root(&self.base_dir);
                let store = FileStore::open(root, self.config.file_store_options())?;
                debug!(root = %store.root().display(), "opened file store");
                Ok(Arc::new(store))
            }
            StoreKind::Memory => {
                warn!("using the in-memory store; the lock is not shared with other processes");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }

    /// Locking service over `store`, whether or not locking is enabled.
    ///
    /// The `lock:*` commands always need a service, even when `run` would
    /// skip locking.
    pub fn locking_service(&self, store: Arc<dyn AtomicStore>) -> Result<LockingService> {
        if !self.config.locking.enabled {
            warn!("locking is disabled in config; operating on the lock anyway");
        }
        LockingService::new(store, self.config.lock_path()?, self.config.lock_timeout())
    }

    /// Orchestrator honoring `locking.enabled`.
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let locking = if self.config.locking.enabled {
            let store = self.open_store()?;
            Some(LockingService::new(
                store,
                self.config.lock_path()?,
                self.config.lock_timeout(),
            )?)
        } else {
            None
        };

        Ok(Orchestrator::new(locking, self.config.retry_policy()))
    }
}
