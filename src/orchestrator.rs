//! Exclusive migration runs on top of the locking service.
//!
//! The orchestrator owns the retry policy and the acquire / work / verify /
//! release sequence. It never retries store failures; only contention is
//! retried.

use crate::clock::{Clock, SystemClock};
use crate::error::{MiglockError, Result};
use crate::locks::LockingService;
use crate::store::AtomicStore;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// How often and how patiently to retry a contended lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub attempts: u32,

    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            attempts: 0,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(1_000),
        }
    }
}

/// Runs work while holding the migration lock.
///
/// With `locking` set to `None` (locking disabled in config) work runs
/// without coordination.
pub struct Orchestrator<S: AtomicStore + ?Sized = dyn AtomicStore, C: Clock = SystemClock> {
    locking: Option<LockingService<S, C>>,
    retry: RetryPolicy,
}

impl<S: AtomicStore + ?Sized, C: Clock> Orchestrator<S, C> {
    pub fn new(locking: Option<LockingService<S, C>>, retry: RetryPolicy) -> Self {
        Self { locking, retry }
    }

    pub fn locking(&self) -> Option<&LockingService<S, C>> {
        self.locking.as_ref()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Acquire the lock for `owner_id`, retrying on contention.
    ///
    /// Returns `MigrationAlreadyRunning` once every attempt found the lock
    /// held. Store errors abort immediately.
    pub fn acquire_with_retry(&self, service: &LockingService<S, C>, owner_id: &str) -> Result<()> {
        let total = self.retry.attempts.saturating_add(1);

        for attempt in 1..=total {
            if service.acquire_lock(owner_id)? {
                return Ok(());
            }
            if attempt < total {
                info!(
                    path = %service.lock_path(),
                    attempt,
                    total,
                    delay_ms = millis_saturating(self.retry.delay),
                    "lock is held, retrying"
                );
                thread::sleep(self.retry.delay);
            }
        }

        let holder = service
            .get_lock_status()?
            .map(|status| status.record.owner_id)
            .unwrap_or_else(|| "an unknown instance".to_string());

        Err(MiglockError::MigrationAlreadyRunning {
            path: service.lock_path().to_string(),
            holder,
        })
    }

    /// Run `work` exclusively.
    ///
    /// 1. Acquire (with retries).
    /// 2. Run `work`.
    /// 3. If `work` succeeded, confirm the lock is still ours; otherwise the
    ///    run overlapped with another instance and fails with `LockLost`.
    /// 4. Release, whatever happened. A failed release is logged and only
    ///    reported when nothing else failed.
    pub fn run_exclusive<T, F>(&self, owner_id: &str, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let Some(service) = self.locking.as_ref() else {
            warn!("locking is disabled, running without coordination");
            return work();
        };

        self.acquire_with_retry(service, owner_id)?;

        let result = work().and_then(|value| {
            if service.verify_lock_ownership(owner_id)? {
                Ok(value)
            } else {
                Err(MiglockError::LockLost(format!(
                    "lock '{}' expired or was taken over while '{}' was running",
                    service.lock_path(),
                    owner_id
                )))
            }
        });

        let released = service.release_lock(owner_id);
        if let Err(e) = &released {
            error!(path = %service.lock_path(), owner_id, error = %e, "failed to release lock");
        }

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), _) => Err(e),
        }
    }
}

/// Whole milliseconds of `d`, clamped to `u64::MAX`.
fn millis_saturating(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
