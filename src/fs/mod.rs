//! Filesystem utilities for miglock.
//!
//! Atomic writes keep file-backed lock records from ever being observed in a
//! partial state.

pub mod atomic;

pub use atomic::{atomic_write, remove_if_exists};
