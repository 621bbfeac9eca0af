//! Directory-backed store shareable by processes on one filesystem.
//!
//! # Layout
//!
//! A record at `default/migrations/_lock` lives in
//! `<root>/default/migrations/_lock.json`. While a transaction runs, a guard
//! file `_lock.json.txn` sits next to it. The guard is created with
//! **create_new** semantics, so exactly one process at a time can be inside
//! the read-compute-write section for a record.
//!
//! # Crash recovery
//!
//! The guard carries JSON metadata (`owner`, `pid`, `created_at`). A guard
//! older than [`FileStoreOptions::txn_stale`] is assumed to belong to a
//! process that crashed mid-transaction and is removed. Breaking a guard goes
//! through a rename to a waiter-unique name, so a waiter never deletes a guard
//! other than the one it judged stale. The stale threshold must stay far above
//! the time a single transaction takes.
//!
//! Writes go through [`crate::fs::atomic_write`], so readers without the guard
//! never see a partial record. Content that is not JSON is surfaced as a JSON
//! string so that callers can still decide what to do with it.

use super::{AtomicStore, StorePath, TransactionOutcome, TxDecision};
use crate::error::{MiglockError, Result};
use crate::fs::{atomic_write, remove_if_exists};
use crate::locks::owner_string;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// Timing knobs for transaction guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStoreOptions {
    /// How long a transaction waits for another process's guard.
    pub txn_wait: Duration,

    /// Age after which a guard is considered abandoned.
    pub txn_stale: Duration,

    /// Pause between attempts to create the guard.
    pub retry_interval: Duration,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            txn_wait: Duration::from_secs(5),
            txn_stale: Duration::from_secs(30),
            retry_interval: Duration::from_millis(10),
        }
    }
}

/// File-per-record [`AtomicStore`].
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    options: FileStoreOptions,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    ///
    /// A root that cannot be created is reported as a connection failure.
    pub fn open<P: Into<PathBuf>>(root: P, options: FileStoreOptions) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            MiglockError::StoreConnection(format!(
                "failed to open store at '{}': {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { root, options })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the record at `path`.
    pub fn record_path(&self, path: &StorePath) -> PathBuf {
        let mut file = self.root.clone();
        for segment in path.segments() {
            file.push(segment);
        }
        let mut name = file.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }

    fn read_record(&self, file: &Path) -> Result<Option<Value>> {
        let content = match fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MiglockError::StoreConnection(format!(
                    "failed to read '{}': {}",
                    file.display(),
                    e
                )));
            }
        };

        Ok(Some(
            serde_json::from_str(&content).unwrap_or(Value::String(content)),
        ))
    }

    fn write_record(&self, file: &Path, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| {
            MiglockError::UserError(format!("failed to serialize record: {}", e))
        })?;
        atomic_write(file, &bytes)
    }
}

impl AtomicStore for FileStore {
    fn get(&self, path: &StorePath) -> Result<Option<Value>> {
        self.read_record(&self.record_path(path))
    }

    fn transaction(
        &self,
        path: &StorePath,
        compute: &mut dyn FnMut(Option<&Value>) -> TxDecision,
    ) -> Result<TransactionOutcome> {
        let file = self.record_path(path);
        let _guard = TxnGuard::acquire(guard_path(&file), &self.options)?;

        let current = self.read_record(&file)?;
        match compute(current.as_ref()) {
            TxDecision::Abort => Ok(TransactionOutcome::aborted(current)),
            TxDecision::Commit(Some(value)) => {
                self.write_record(&file, &value)?;
                Ok(TransactionOutcome::committed(Some(value)))
            }
            TxDecision::Commit(None) => {
                remove_if_exists(&file)?;
                Ok(TransactionOutcome::committed(None))
            }
        }
    }
}

/// `<record>.json` -> `<record>.json.txn`
pub(super) fn guard_path(record: &Path) -> PathBuf {
    let mut name: OsString = record.as_os_str().to_owned();
    name.push(".txn");
    PathBuf::from(name)
}

/// Metadata written into a transaction guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct GuardMetadata {
    pub(super) owner: String,
    pub(super) pid: u32,
    pub(super) created_at: DateTime<Utc>,
}

/// RAII guard for a record's transaction section.
///
/// When dropped, the guard file is deleted. A failed delete is logged; the
/// next transaction treats the leftover as stale once it ages out.
#[derive(Debug)]
struct TxnGuard {
    path: PathBuf,
}

impl TxnGuard {
    fn acquire(path: PathBuf, options: &FileStoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                MiglockError::StoreConnection(format!(
                    "failed to create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let deadline = Instant::now() + options.txn_wait;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let metadata = GuardMetadata {
                        owner: owner_string(),
                        pid: std::process::id(),
                        created_at: Utc::now(),
                    };
                    let guard = Self { path };
                    let json = serde_json::to_vec(&metadata).map_err(|e| {
                        MiglockError::UserError(format!("failed to serialize guard: {}", e))
                    })?;
                    file.write_all(&json).map_err(|e| {
                        MiglockError::StoreConnection(format!(
                            "failed to write transaction guard '{}': {}",
                            guard.path.display(),
                            e
                        ))
                    })?;
                    return Ok(guard);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(created) = guard_created_at(&path)
                        && is_older_than(created, options.txn_stale)
                    {
                        break_stale_guard(&path, created)?;
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(MiglockError::StoreConnection(format!(
                            "timed out after {}ms waiting for transaction guard '{}'",
                            options.txn_wait.as_millis(),
                            path.display()
                        )));
                    }
                    thread::sleep(options.retry_interval);
                }
                Err(e) => {
                    return Err(MiglockError::StoreConnection(format!(
                        "failed to create transaction guard '{}': {}",
                        path.display(),
                        e
                    )));
                }
            }
        }
    }
}

impl Drop for TxnGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(guard = %self.path.display(), error = %e, "failed to remove transaction guard");
        } else {
            debug!(guard = %self.path.display(), "transaction guard released");
        }
    }
}

/// Creation time from the guard's own metadata, falling back to the file's
/// mtime while the metadata is still being written.
pub(super) fn guard_created_at(path: &Path) -> Option<SystemTime> {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<GuardMetadata>(&content).ok())
        .map(|meta| meta.created_at.into())
        .or_else(|| fs::metadata(path).and_then(|m| m.modified()).ok())
}

fn is_older_than(created: SystemTime, stale_after: Duration) -> bool {
    SystemTime::now()
        .duration_since(created)
        .map(|age| age > stale_after)
        .unwrap_or(false)
}

/// Remove the stale guard at `path` that was created at `judged`.
///
/// The guard is first renamed to a name unique to this waiter, so only one
/// waiter ends up holding it. If what was moved is not the guard judged stale
/// (another waiter broke it and a live transaction created a new one in the
/// meantime), it is linked back into place instead of being deleted.
pub(super) fn break_stale_guard(path: &Path, judged: SystemTime) -> Result<()> {
    let aside = stale_guard_path(path);
    match fs::rename(path, &aside) {
        Ok(()) => {}
        // Someone else already broke it.
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(MiglockError::StoreConnection(format!(
                "failed to break stale transaction guard '{}': {}",
                path.display(),
                e
            )));
        }
    }

    if guard_created_at(&aside) == Some(judged) {
        warn!(guard = %path.display(), "broke stale transaction guard");
        return remove_if_exists(&aside);
    }

    match fs::hard_link(&aside, path) {
        Ok(()) => debug!(guard = %path.display(), "restored live transaction guard"),
        Err(e) => warn!(
            guard = %path.display(),
            error = %e,
            "failed to restore live transaction guard"
        ),
    }
    remove_if_exists(&aside)
}

/// `<guard>.stale.<pid>.<nanos>.<seq>`
fn stale_guard_path(guard: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut name: OsString = guard.as_os_str().to_owned();
    name.push(format!(
        ".stale.{}.{}.{}",
        std::process::id(),
        nanos,
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    PathBuf::from(name)
}
