//! Atomic record stores.
//!
//! The locking protocol depends on exactly one capability from its backing
//! store: a serialized read-compute-write on a single record, here
//! [`AtomicStore::transaction`]. Any store offering compare-and-swap or
//! conditional writes can implement it.
//!
//! # Transaction contract
//!
//! 1. Read the current value at the path (`None` when absent).
//! 2. Call `compute` with it. The function must be free of side effects on
//!    the store; it may be called more than once.
//! 3. On [`TxDecision::Commit`], write the candidate (or delete on `None`)
//!    only if nobody changed the record since step 1. If someone did, go back
//!    to step 1.
//! 4. On [`TxDecision::Abort`], leave the record untouched.
//!
//! Implementations:
//! - [`MemoryStore`]: optimistic versioned map, in-process only.
//! - [`FileStore`]: one JSON file per record, shareable across processes.

mod file;
mod memory;
mod path;


pub use file::{FileStore, FileStoreOptions};
#[cfg(test)]
use file::{GuardMetadata, break_stale_guard, guard_created_at, guard_path};
pub use memory::MemoryStore;
pub use path::StorePath;

use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

/// What a transaction's compute function wants done with the record.
#[derive(Debug, Clone, PartialEq)]
pub enum TxDecision {
    /// Store this value; `None` deletes the record.
    Commit(Option<Value>),
    /// Leave the record unchanged.
    Abort,
}

/// Result of a completed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    /// Whether the commit branch ran and was written.
    pub committed: bool,

    /// The record as stored when the transaction finished.
    pub value: Option<Value>,
}

impl TransactionOutcome {
    pub fn committed(value: Option<Value>) -> Self {
        Self {
            committed: true,
            value,
        }
    }

    pub fn aborted(value: Option<Value>) -> Self {
        Self {
            committed: false,
            value,
        }
    }
}

/// A store holding JSON records at slash-separated paths.
pub trait AtomicStore: Send + Sync {
    /// Read the record at `path`.
    fn get(&self, path: &StorePath) -> Result<Option<Value>>;

    /// Run a transactional update against the record at `path`.
    fn transaction(
        &self,
        path: &StorePath,
        compute: &mut dyn FnMut(Option<&Value>) -> TxDecision,
    ) -> Result<TransactionOutcome>;
}

impl<S: AtomicStore + ?Sized> AtomicStore for Arc<S> {
    fn get(&self, path: &StorePath) -> Result<Option<Value>> {
        (**self).get(path)
    }

    fn transaction(
        &self,
        path: &StorePath,
        compute: &mut dyn FnMut(Option<&Value>) -> TxDecision,
    ) -> Result<TransactionOutcome> {
        (**self).transaction(path, compute)
    }
}
