//! The lock protocol over an [`AtomicStore`].

use super::owner::validate_owner_id;
use super::record::{LockRecord, LockStatus};
use crate::clock::{Clock, SystemClock};
use crate::error::{MiglockError, Result};
use crate::store::{AtomicStore, StorePath, TransactionOutcome, TxDecision};
use chrono::TimeDelta;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default lock timeout (10 minutes).
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(600_000);

/// Largest accepted lock timeout (100 years). Expiry timestamps are computed
/// as `acquired_at + timeout` and must stay representable.
pub const MAX_LOCK_TIMEOUT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Mutual exclusion over a single lock path.
///
/// State machine over the path: **Unlocked** (no record, or an expired one)
/// and **Locked(owner, expires_at)**. Every mutation goes through
/// [`AtomicStore::transaction`]; the service never does a plain
/// read-then-write. Contention, non-owner releases and expired records are
/// ordinary return values. Only store failures and corrupt records are errors.
///
/// The timeout is fixed per acquisition and nothing renews it implicitly. A
/// holder that works longer than the timeout can be overtaken, so callers
/// should check [`LockingService::verify_lock_ownership`] before committing
/// their results, or opt into [`LockingService::renew_lock`].
pub struct LockingService<S: AtomicStore + ?Sized = dyn AtomicStore, C: Clock = SystemClock> {
    store: Arc<S>,
    clock: C,
    lock_path: StorePath,
    timeout: TimeDelta,
}

// Manual Clone so that `S` need not be Clone.
impl<S: AtomicStore + ?Sized, C: Clock + Clone> Clone for LockingService<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: self.clock.clone(),
            lock_path: self.lock_path.clone(),
            timeout: self.timeout,
        }
    }
}

impl<S: AtomicStore + ?Sized> LockingService<S, SystemClock> {
    /// Create a service for `lock_path` using the system clock.
    ///
    /// # Errors
    ///
    /// Returns `UserError` if `timeout` is zero or above [`MAX_LOCK_TIMEOUT`].
    pub fn new(store: Arc<S>, lock_path: StorePath, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(MiglockError::UserError(
                "lock timeout must be greater than 0".to_string(),
            ));
        }
        if timeout > MAX_LOCK_TIMEOUT {
            return Err(MiglockError::UserError(format!(
                "lock timeout {:?} exceeds the maximum of {:?}",
                timeout, MAX_LOCK_TIMEOUT
            )));
        }
        let timeout = TimeDelta::from_std(timeout).map_err(|_| {
            MiglockError::UserError(format!("lock timeout {:?} is out of range", timeout))
        })?;

        Ok(Self {
            store,
            clock: SystemClock,
            lock_path,
            timeout,
        })
    }
}

impl<S: AtomicStore + ?Sized, C: Clock> LockingService<S, C> {
    /// Swap the clock used for expiry math.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> LockingService<S, C2> {
        LockingService {
            store: self.store,
            clock,
            lock_path: self.lock_path,
            timeout: self.timeout,
        }
    }

    pub fn lock_path(&self) -> &StorePath {
        &self.lock_path
    }

    pub fn timeout(&self) -> TimeDelta {
        self.timeout
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Try to take the lock for `owner_id`.
    ///
    /// Returns `true` if this call's record was committed, `false` if a valid
    /// record (held by anyone, including `owner_id` itself) is already there.
    /// An expired record is overwritten. When many callers race on an
    /// unlocked path, the store serializes them and exactly one wins.
    ///
    /// # Errors
    ///
    /// - `UserError` for an empty owner id
    /// - `StoreConnection` if the store is unreachable
    /// - `CorruptRecord` if the stored value is not a lock record
    pub fn acquire_lock(&self, owner_id: &str) -> Result<bool> {
        validate_owner_id(owner_id)?;

        let mut failure: Option<MiglockError> = None;
        let mut superseded: Option<String> = None;
        let outcome = self.store.transaction(&self.lock_path, &mut |current| {
            failure = None;
            superseded = None;
            let now = self.clock.now();

            if let Some(value) = current {
                match self.decode(value) {
                    Ok(existing) if existing.is_valid(now) => return TxDecision::Abort,
                    Ok(expired) => superseded = Some(expired.owner_id),
                    Err(e) => {
                        failure = Some(e);
                        return TxDecision::Abort;
                    }
                }
            }

            match LockRecord::new(owner_id, now, self.timeout).to_value() {
                Ok(candidate) => TxDecision::Commit(Some(candidate)),
                Err(e) => {
                    failure = Some(MiglockError::UserError(format!(
                        "failed to serialize lock record: {}",
                        e
                    )));
                    TxDecision::Abort
                }
            }
        })?;

        if let Some(err) = failure {
            return Err(err);
        }

        if outcome.committed {
            if let Some(previous) = superseded {
                info!(path = %self.lock_path, owner_id, previous_owner = %previous, "took over expired lock");
            }
            info!(path = %self.lock_path, owner_id, "lock acquired");
        } else {
            let holder = self.holder_of(&outcome);
            debug!(
                path = %self.lock_path,
                owner_id,
                holder = holder.as_deref().unwrap_or("unknown"),
                "lock is held"
            );
        }

        Ok(outcome.committed)
    }

    /// `true` iff a valid record owned by `owner_id` is stored.
    ///
    /// Call this right before committing the results of guarded work: the lock
    /// may have expired (and been taken by someone else) in the meantime.
    pub fn verify_lock_ownership(&self, owner_id: &str) -> Result<bool> {
        let Some(record) = self.read_record()? else {
            return Ok(false);
        };

        let held = record.is_held_by(owner_id, self.clock.now());
        if !held {
            debug!(path = %self.lock_path, owner_id, holder = %record.owner_id, "ownership check failed");
        }
        Ok(held)
    }

    /// Delete the record if, and only if, `owner_id` owns it.
    ///
    /// Releasing a lock held by someone else, or no lock at all, is a silent
    /// no-op. Callers that need to know which happened should call
    /// [`LockingService::verify_lock_ownership`] first.
    pub fn release_lock(&self, owner_id: &str) -> Result<()> {
        let mut failure: Option<MiglockError> = None;
        let outcome = self.store.transaction(&self.lock_path, &mut |current| {
            failure = None;
            let Some(value) = current else {
                return TxDecision::Abort;
            };

            match self.decode(value) {
                Ok(record) if record.owner_id == owner_id => TxDecision::Commit(None),
                Ok(_) => TxDecision::Abort,
                Err(e) => {
                    failure = Some(e);
                    TxDecision::Abort
                }
            }
        })?;

        if let Some(err) = failure {
            return Err(err);
        }

        if outcome.committed {
            info!(path = %self.lock_path, owner_id, "lock released");
        } else {
            debug!(path = %self.lock_path, owner_id, "release skipped, lock not held by owner");
        }
        Ok(())
    }

    /// Delete whatever is stored at the lock path, regardless of owner,
    /// expiry, or whether it even decodes.
    ///
    /// Administrative escape hatch for a stuck lock.
    pub fn force_release_lock(&self) -> Result<()> {
        let mut previous: Option<Value> = None;
        self.store.transaction(&self.lock_path, &mut |current| {
            previous = current.cloned();
            TxDecision::Commit(None)
        })?;

        match previous {
            Some(value) => {
                let holder = LockRecord::from_value(&value)
                    .map(|record| record.owner_id)
                    .unwrap_or_else(|_| "<unreadable record>".to_string());
                warn!(path = %self.lock_path, previous_owner = %holder, "lock force-released");
            }
            None => debug!(path = %self.lock_path, "force release on empty lock path"),
        }
        Ok(())
    }

    /// The current lock, or `None` when the path is empty or the record has
    /// expired.
    ///
    /// Expiry is evaluated at read time; an expired record is left in place
    /// until the next acquisition overwrites it.
    pub fn get_lock_status(&self) -> Result<Option<LockStatus>> {
        let Some(record) = self.read_record()? else {
            return Ok(None);
        };

        if record.is_expired(self.clock.now()) {
            return Ok(None);
        }
        Ok(Some(LockStatus::from(record)))
    }

    /// Push the expiry of a lock held by `owner_id` to `now + timeout`.
    ///
    /// Returns `false` without touching the record if it is absent, expired,
    /// or owned by someone else. An expired lock must be re-acquired instead.
    /// Nothing in the crate calls this implicitly.
    pub fn renew_lock(&self, owner_id: &str) -> Result<bool> {
        let mut failure: Option<MiglockError> = None;
        let outcome = self.store.transaction(&self.lock_path, &mut |current| {
            failure = None;
            let Some(value) = current else {
                return TxDecision::Abort;
            };
            let now = self.clock.now();

            let record = match self.decode(value) {
                Ok(record) if record.is_held_by(owner_id, now) => record,
                Ok(_) => return TxDecision::Abort,
                Err(e) => {
                    failure = Some(e);
                    return TxDecision::Abort;
                }
            };

            match record.renewed(now, self.timeout).to_value() {
                Ok(value) => TxDecision::Commit(Some(value)),
                Err(e) => {
                    failure = Some(MiglockError::UserError(format!(
                        "failed to serialize lock record: {}",
                        e
                    )));
                    TxDecision::Abort
                }
            }
        })?;

        if let Some(err) = failure {
            return Err(err);
        }

        if outcome.committed {
            debug!(path = %self.lock_path, owner_id, "lock renewed");
        }
        Ok(outcome.committed)
    }

    fn read_record(&self) -> Result<Option<LockRecord>> {
        self.store
            .get(&self.lock_path)?
            .map(|value| self.decode(&value))
            .transpose()
    }

    fn decode(&self, value: &Value) -> Result<LockRecord> {
        LockRecord::from_value(value).map_err(|e| MiglockError::CorruptRecord {
            path: self.lock_path.to_string(),
            reason: e.to_string(),
        })
    }

    fn holder_of(&self, outcome: &TransactionOutcome) -> Option<String> {
        outcome
            .value
            .as_ref()
            .and_then(|value| LockRecord::from_value(value).ok())
            .map(|record| record.owner_id)
    }
}
