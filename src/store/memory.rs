//! In-process store with optimistic, version-checked transactions.

use super::{AtomicStore, StorePath, TransactionOutcome, TxDecision};
use crate::error::{MiglockError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// A versioned slot. Deletes bump the version too, so a delete followed by a
/// re-create is still seen as a conflict by a transaction that read before.
#[derive(Debug, Default)]
struct Slot {
    version: u64,
    value: Option<Value>,
}

/// Map-backed [`AtomicStore`].
///
/// `compute` runs without the map lock held; the commit re-checks the slot
/// version and starts over on mismatch, the same way a compare-and-swap
/// backend would. [`MemoryStore::set_available`] simulates an outage.
#[derive(Debug)]
pub struct MemoryStore {
    slots: Mutex<HashMap<StorePath, Slot>>,
    available: AtomicBool,
    conflicts: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            conflicts: AtomicU64::new(0),
        }
    }

    /// Toggle the simulated connection. While unavailable every call fails
    /// with [`MiglockError::StoreConnection`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of commits that lost a race and were retried.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MiglockError::StoreConnection(
                "memory store is unavailable".to_string(),
            ))
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<StorePath, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self, path: &StorePath) -> (u64, Option<Value>) {
        self.slots()
            .get(path)
            .map(|slot| (slot.version, slot.value.clone()))
            .unwrap_or((0, None))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicStore for MemoryStore {
    fn get(&self, path: &StorePath) -> Result<Option<Value>> {
        self.check_available()?;
        Ok(self.snapshot(path).1)
    }

    fn transaction(
        &self,
        path: &StorePath,
        compute: &mut dyn FnMut(Option<&Value>) -> TxDecision,
    ) -> Result<TransactionOutcome> {
        loop {
            self.check_available()?;
            let (version, current) = self.snapshot(path);

            let next = match compute(current.as_ref()) {
                TxDecision::Abort => return Ok(TransactionOutcome::aborted(current)),
                TxDecision::Commit(next) => next,
            };

            let mut slots = self.slots();
            let slot = slots.entry(path.clone()).or_default();
            if slot.version != version {
                drop(slots);
                self.conflicts.fetch_add(1, Ordering::SeqCst);
                trace!(path = %path, read_version = version, "transaction conflict, retrying");
                continue;
            }

            slot.version += 1;
            slot.value = next.clone();
            return Ok(TransactionOutcome::committed(next));
        }
    }
}
