//! Miglock: a distributed lock that serializes database migrations across
//! concurrently starting deploy instances.
//!
//! The lock is a single record in a shared [`store::AtomicStore`]. All writes
//! go through the store's transactional update, so when several instances
//! start at once exactly one of them acquires the lock and runs migrations.
//! Locks expire after a timeout, so a crashed holder blocks others for at
//! most that long.
//!
//! ```no_run
//! use miglock::locks::{DEFAULT_LOCK_TIMEOUT, LockingService};
//! use miglock::store::{FileStore, FileStoreOptions, StorePath};
//! use std::sync::Arc;
//!
//! # fn main() -> miglock::error::Result<()> {
//! let store = Arc::new(FileStore::open(".miglock/store", FileStoreOptions::default())?);
//! let path = StorePath::join("default", "migrations/_lock")?;
//! let locks = LockingService::new(store, path, DEFAULT_LOCK_TIMEOUT)?;
//!
//! if locks.acquire_lock("deploy-1")? {
//!     // ... run migrations ...
//!     locks.release_lock("deploy-1")?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod locks;
pub mod orchestrator;
pub mod store;
