//! Distributed migration lock.
//!
//! One lock lives at a single well-known store path, conventionally
//! `<namespace>/migrations/_lock`. The path holds no record (unlocked) or
//! exactly one [`LockRecord`]. Records are only ever written through the
//! store's transactional update, which is what gives concurrently started
//! instances a single winner.
//!
//! # Lock Record
//!
//! The record holds JSON with epoch-millisecond timestamps:
//! - `ownerId`: opaque id of the holder, supplied by the caller
//! - `acquiredAt`: when the lock was taken
//! - `expiresAt`: `acquiredAt + timeout`
//!
//! # Expiry
//!
//! A record is valid while `now < expiresAt`. Expired records are treated as
//! absent by every operation and are overwritten by the next acquisition.
//! Each instance reads `now` from its own clock, so correctness depends on
//! clock skew between instances staying well below the timeout.

mod owner;
mod record;
mod service;

#[cfg(test)]
mod tests;

// Re-export public API
pub use owner::{
    OWNER_ENV, configured_owner_id, generate_owner_id, owner_string, resolve_owner_id,
    validate_owner_id,
};
pub use record::{LockRecord, LockStatus, format_duration};
pub use service::{DEFAULT_LOCK_TIMEOUT, LockingService, MAX_LOCK_TIMEOUT};
