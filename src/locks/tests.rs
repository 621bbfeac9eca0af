//! Tests for the locking service.

use super::*;
use crate::clock::ManualClock;
use crate::error::MiglockError;
use crate::store::{AtomicStore, FileStore, FileStoreOptions, MemoryStore, StorePath, TxDecision};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn lock_path() -> StorePath {
    StorePath::parse("default/migrations/_lock").unwrap()
}

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
}

/// A service over a fresh memory store, driven by a manual clock.
fn manual_service(
    timeout_ms: u64,
) -> (
    Arc<MemoryStore>,
    ManualClock,
    LockingService<MemoryStore, ManualClock>,
) {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(start());
    let service = LockingService::new(
        Arc::clone(&store),
        lock_path(),
        Duration::from_millis(timeout_ms),
    )
    .unwrap()
    .with_clock(clock.clone());
    (store, clock, service)
}

fn write_raw(store: &MemoryStore, value: serde_json::Value) {
    store
        .transaction(&lock_path(), &mut |_| TxDecision::Commit(Some(value.clone())))
        .unwrap();
}

// ============================================================================
// Acquisition
// ============================================================================

#[test]
fn test_acquire_on_unlocked_path_succeeds() {
    let (_store, _clock, service) = manual_service(600_000);

    assert!(service.acquire_lock("a").unwrap());

    let status = service.get_lock_status().unwrap().unwrap();
    assert_eq!(status.record.owner_id, "a");
    assert_eq!(status.record.acquired_at, start());
    assert_eq!(
        status.record.expires_at,
        start() + TimeDelta::milliseconds(600_000)
    );
    assert!(status.is_locked);
}

#[test]
fn test_acquire_while_held_returns_false() {
    let (_store, _clock, service) = manual_service(5_000);
    assert!(service.acquire_lock("a").unwrap());

    assert!(!service.acquire_lock("b").unwrap());
    // Not re-entrant: the holder itself cannot acquire again either.
    assert!(!service.acquire_lock("a").unwrap());

    let status = service.get_lock_status().unwrap().unwrap();
    assert_eq!(status.record.owner_id, "a");
}

#[test]
fn test_acquire_rejects_empty_owner_without_touching_store() {
    let (store, _clock, service) = manual_service(5_000);

    let err = service.acquire_lock("").unwrap_err();

    assert!(matches!(err, MiglockError::UserError(_)));
    assert_eq!(store.get(&lock_path()).unwrap(), None);
}

#[test]
fn test_acquire_writes_wire_format() {
    let (store, _clock, service) = manual_service(5_000);

    service.acquire_lock("a").unwrap();

    assert_eq!(
        store.get(&lock_path()).unwrap(),
        Some(json!({
            "ownerId": "a",
            "acquiredAt": 1_700_000_000_000_i64,
            "expiresAt": 1_700_000_005_000_i64
        }))
    );
}

#[test]
fn test_mutual_exclusion_under_concurrent_acquire() {
    const CONTENDERS: usize = 32;

    let store: Arc<dyn AtomicStore> = Arc::new(MemoryStore::new());
    let barrier = Arc::new(Barrier::new(CONTENDERS));

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|i| {
            // Each thread plays an independent instance with its own service.
            let service =
                LockingService::new(Arc::clone(&store), lock_path(), DEFAULT_LOCK_TIMEOUT)
                    .unwrap();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.acquire_lock(&format!("instance-{}", i)).unwrap()
            })
        })
        .collect();

    let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|won| **won).count(), 1);
    assert_eq!(results.iter().filter(|won| !**won).count(), CONTENDERS - 1);
}

#[test]
fn test_mutual_exclusion_over_expired_record() {
    const CONTENDERS: usize = 16;

    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(start());
    let stale = LockingService::new(Arc::clone(&store), lock_path(), Duration::from_secs(1))
        .unwrap()
        .with_clock(clock.clone());
    assert!(stale.acquire_lock("crashed").unwrap());
    clock.advance(TimeDelta::seconds(2));

    let barrier = Arc::new(Barrier::new(CONTENDERS));
    let handles: Vec<_> = (0..CONTENDERS)
        .map(|i| {
            let service = stale.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.acquire_lock(&format!("instance-{}", i)).unwrap()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    let holder = stale.get_lock_status().unwrap().unwrap().record.owner_id;
    assert!(holder.starts_with("instance-"));
}

#[test]
fn test_mutual_exclusion_across_file_store_instances() {
    let temp_dir = TempDir::new().unwrap();
    let options = FileStoreOptions {
        txn_wait: Duration::from_secs(10),
        ..FileStoreOptions::default()
    };
    let first = LockingService::new(
        Arc::new(FileStore::open(temp_dir.path(), options).unwrap()),
        lock_path(),
        DEFAULT_LOCK_TIMEOUT,
    )
    .unwrap();
    let second = LockingService::new(
        Arc::new(FileStore::open(temp_dir.path(), options).unwrap()),
        lock_path(),
        DEFAULT_LOCK_TIMEOUT,
    )
    .unwrap();

    assert!(first.acquire_lock("a").unwrap());
    assert!(!second.acquire_lock("b").unwrap());
    assert!(second.verify_lock_ownership("a").unwrap());

    first.release_lock("a").unwrap();
    assert!(second.acquire_lock("b").unwrap());
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn test_expired_lock_reads_as_unlocked_and_can_be_taken() {
    let (store, clock, service) = manual_service(5_000);
    assert!(service.acquire_lock("x").unwrap());

    clock.advance(TimeDelta::milliseconds(5_001));

    assert!(service.get_lock_status().unwrap().is_none());
    // Status reads do not clean up; the record is still physically there.
    assert!(store.get(&lock_path()).unwrap().is_some());

    assert!(service.acquire_lock("y").unwrap());
    let status = service.get_lock_status().unwrap().unwrap();
    assert_eq!(status.record.owner_id, "y");
    assert_eq!(status.record.acquired_at, start() + TimeDelta::milliseconds(5_001));
}

#[test]
fn test_lock_expires_exactly_at_expires_at() {
    let (_store, clock, service) = manual_service(1_000);
    service.acquire_lock("x").unwrap();

    clock.advance(TimeDelta::milliseconds(999));
    assert!(service.get_lock_status().unwrap().is_some());

    clock.advance(TimeDelta::milliseconds(1));
    assert!(service.get_lock_status().unwrap().is_none());
}

#[test]
fn test_verify_tracks_expiry_without_release() {
    let (_store, clock, service) = manual_service(1_000);
    service.acquire_lock("x").unwrap();

    assert!(service.verify_lock_ownership("x").unwrap());

    clock.advance(TimeDelta::milliseconds(1_200));
    assert!(!service.verify_lock_ownership("x").unwrap());
}

#[test]
fn test_verify_tracks_expiry_on_wall_clock() {
    let store = Arc::new(MemoryStore::new());
    let service = LockingService::new(store, lock_path(), Duration::from_millis(1_000)).unwrap();
    assert!(service.acquire_lock("x").unwrap());

    assert!(service.verify_lock_ownership("x").unwrap());

    thread::sleep(Duration::from_millis(1_200));
    assert!(!service.verify_lock_ownership("x").unwrap());
}

#[test]
fn test_verify_rejects_other_owner_and_empty_path() {
    let (_store, _clock, service) = manual_service(5_000);
    assert!(!service.verify_lock_ownership("x").unwrap());

    service.acquire_lock("x").unwrap();
    assert!(!service.verify_lock_ownership("y").unwrap());
}

#[test]
fn test_takeover_scenario() {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(start());
    let instance_a = LockingService::new(Arc::clone(&store), lock_path(), Duration::from_millis(5_000))
        .unwrap()
        .with_clock(clock.clone());
    let instance_b = instance_a.clone();

    assert!(instance_a.acquire_lock("A").unwrap());
    assert!(!instance_b.acquire_lock("B").unwrap());

    clock.advance(TimeDelta::milliseconds(6_000));

    assert!(instance_b.acquire_lock("B").unwrap());
    assert!(!instance_a.verify_lock_ownership("A").unwrap());
    assert!(instance_b.verify_lock_ownership("B").unwrap());
}

// ============================================================================
// Release
// ============================================================================

#[test]
fn test_release_by_owner_unlocks() {
    let (store, _clock, service) = manual_service(5_000);
    service.acquire_lock("x").unwrap();

    service.release_lock("x").unwrap();

    assert!(service.get_lock_status().unwrap().is_none());
    assert_eq!(store.get(&lock_path()).unwrap(), None);
}

#[test]
fn test_release_by_non_owner_is_noop() {
    let (_store, _clock, service) = manual_service(5_000);
    service.acquire_lock("x").unwrap();

    service.release_lock("y").unwrap();

    let status = service.get_lock_status().unwrap().unwrap();
    assert_eq!(status.record.owner_id, "x");
}

#[test]
fn test_release_is_idempotent() {
    let (_store, _clock, service) = manual_service(5_000);
    service.acquire_lock("x").unwrap();

    service.release_lock("x").unwrap();
    assert!(service.get_lock_status().unwrap().is_none());

    service.release_lock("x").unwrap();
    assert!(service.get_lock_status().unwrap().is_none());
}

#[test]
fn test_release_after_takeover_keeps_new_holder() {
    let (_store, clock, service) = manual_service(1_000);
    service.acquire_lock("old").unwrap();
    clock.advance(TimeDelta::seconds(2));
    service.acquire_lock("new").unwrap();

    service.release_lock("old").unwrap();

    let status = service.get_lock_status().unwrap().unwrap();
    assert_eq!(status.record.owner_id, "new");
}

#[test]
fn test_force_release_is_unconditional() {
    let (_store, _clock, service) = manual_service(600_000);
    service.acquire_lock("x").unwrap();

    service.force_release_lock().unwrap();

    assert!(service.get_lock_status().unwrap().is_none());
    assert!(service.acquire_lock("anyone").unwrap());
}

#[test]
fn test_force_release_on_empty_path() {
    let (_store, _clock, service) = manual_service(5_000);

    service.force_release_lock().unwrap();

    assert!(service.get_lock_status().unwrap().is_none());
}

// ============================================================================
// Renewal
// ============================================================================

#[test]
fn test_renew_extends_owned_lock() {
    let (_store, clock, service) = manual_service(1_000);
    service.acquire_lock("x").unwrap();

    clock.advance(TimeDelta::milliseconds(800));
    assert!(service.renew_lock("x").unwrap());

    clock.advance(TimeDelta::milliseconds(800));
    let status = service.get_lock_status().unwrap().unwrap();
    assert_eq!(status.record.acquired_at, start());
    assert_eq!(status.record.expires_at, start() + TimeDelta::milliseconds(1_800));
    assert!(service.verify_lock_ownership("x").unwrap());
}

#[test]
fn test_renew_refuses_other_owner_expired_or_absent() {
    let (_store, clock, service) = manual_service(1_000);
    assert!(!service.renew_lock("x").unwrap());

    service.acquire_lock("x").unwrap();
    assert!(!service.renew_lock("y").unwrap());

    clock.advance(TimeDelta::milliseconds(1_000));
    assert!(!service.renew_lock("x").unwrap());
    assert!(service.get_lock_status().unwrap().is_none());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_store_outage_propagates_from_every_operation() {
    let (store, _clock, service) = manual_service(5_000);
    store.set_available(false);

    let results = [
        service.acquire_lock("x").map(|_| ()),
        service.verify_lock_ownership("x").map(|_| ()),
        service.release_lock("x"),
        service.force_release_lock(),
        service.get_lock_status().map(|_| ()),
        service.renew_lock("x").map(|_| ()),
    ];

    for result in results {
        let err = result.unwrap_err();
        assert!(matches!(err, MiglockError::StoreConnection(_)), "{err}");
        assert_eq!(err.exit_code(), crate::exit_codes::STORE_CONNECTION_ERROR);
    }
}

#[test]
fn test_corrupt_record_is_reported_and_force_release_clears_it() {
    let (store, _clock, service) = manual_service(5_000);
    write_raw(&store, json!({"owner": "legacy"}));

    assert!(matches!(
        service.acquire_lock("x").unwrap_err(),
        MiglockError::CorruptRecord { .. }
    ));
    assert!(matches!(
        service.get_lock_status().unwrap_err(),
        MiglockError::CorruptRecord { .. }
    ));
    assert!(matches!(
        service.verify_lock_ownership("x").unwrap_err(),
        MiglockError::CorruptRecord { .. }
    ));
    assert!(matches!(
        service.release_lock("x").unwrap_err(),
        MiglockError::CorruptRecord { .. }
    ));
    assert_eq!(store.get(&lock_path()).unwrap(), Some(json!({"owner": "legacy"})));

    service.force_release_lock().unwrap();
    assert!(service.acquire_lock("x").unwrap());
}

#[test]
fn test_zero_timeout_is_rejected() {
    let store = Arc::new(MemoryStore::new());

    let result = LockingService::new(store, lock_path(), Duration::ZERO);

    assert!(matches!(result, Err(MiglockError::UserError(_))));
}

#[test]
fn test_services_on_different_paths_are_independent() {
    let store = Arc::new(MemoryStore::new());
    let staging = LockingService::new(
        Arc::clone(&store),
        StorePath::parse("staging/migrations/_lock").unwrap(),
        DEFAULT_LOCK_TIMEOUT,
    )
    .unwrap();
    let prod = LockingService::new(
        Arc::clone(&store),
        StorePath::parse("prod/migrations/_lock").unwrap(),
        DEFAULT_LOCK_TIMEOUT,
    )
    .unwrap();

    assert!(staging.acquire_lock("a").unwrap());
    assert!(prod.acquire_lock("b").unwrap());
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_new_rejects_zero_timeout() {
    let result = LockingService::new(Arc::new(MemoryStore::new()), lock_path(), Duration::ZERO);

    assert!(matches!(result, Err(MiglockError::UserError(_))));
}

#[test]
fn test_new_rejects_timeout_beyond_maximum() {
    let result = LockingService::new(
        Arc::new(MemoryStore::new()),
        lock_path(),
        Duration::from_millis(9_000_000_000_000_000),
    );

    let Err(MiglockError::UserError(message)) = result else {
        panic!("expected a user error");
    };
    assert!(message.contains("exceeds the maximum"));
}

#[test]
fn test_maximum_timeout_acquires_and_renews() {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(start());
    let service = LockingService::new(Arc::clone(&store), lock_path(), MAX_LOCK_TIMEOUT)
        .unwrap()
        .with_clock(clock.clone());

    assert!(service.acquire_lock("a").unwrap());
    let status = service.get_lock_status().unwrap().unwrap();
    assert_eq!(
        (status.record.expires_at - status.record.acquired_at).num_milliseconds() as u128,
        MAX_LOCK_TIMEOUT.as_millis()
    );

    clock.advance(TimeDelta::days(365));
    assert!(service.renew_lock("a").unwrap());
    assert!(service.verify_lock_ownership("a").unwrap());
}
