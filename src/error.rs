//! Error types for miglock.
//!
//! Only infrastructure failures and misuse are errors. Lock contention,
//! releases by a non-owner and expired records are ordinary return values of
//! the locking service and never show up here.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for miglock operations.
///
/// Each variant maps to an exit code through [`MiglockError::exit_code`].
#[derive(Error, Debug)]
pub enum MiglockError {
    /// Invalid arguments, invalid configuration, or a misused API.
    #[error("{0}")]
    UserError(String),

    /// The backing store is unreachable or failed an I/O operation.
    #[error("Store connection failed: {0}")]
    StoreConnection(String),

    /// The value stored at the lock path is not a lock record.
    #[error("Corrupt lock record at '{path}': {reason}")]
    CorruptRecord { path: String, reason: String },

    /// Another instance holds the lock and the retry budget is exhausted.
    #[error("Migration already running: lock '{path}' is held by {holder}")]
    MigrationAlreadyRunning { path: String, holder: String },

    /// The migration work itself failed while the lock was held.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// The lock expired or was taken over before the run completed.
    #[error("Lock lost before the migration completed: {0}")]
    LockLost(String),
}

impl MiglockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            MiglockError::StoreConnection(_) => exit_codes::STORE_CONNECTION_ERROR,
            MiglockError::UserError(_)
            | MiglockError::CorruptRecord { .. }
            | MiglockError::MigrationAlreadyRunning { .. }
            | MiglockError::MigrationFailed(_)
            | MiglockError::LockLost(_) => exit_codes::GENERAL_ERROR,
        }
    }
}

/// Result type alias for miglock operations.
pub type Result<T> = std::result::Result<T, MiglockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_connection_error_has_its_own_exit_code() {
        let err = MiglockError::StoreConnection("connection refused".to_string());
        assert_eq!(err.exit_code(), exit_codes::STORE_CONNECTION_ERROR);
    }

    #[test]
    fn logical_failures_are_general_errors() {
        let errors = [
            MiglockError::UserError("bad argument".to_string()),
            MiglockError::CorruptRecord {
                path: "default/migrations/_lock".to_string(),
                reason: "missing field `ownerId`".to_string(),
            },
            MiglockError::MigrationAlreadyRunning {
                path: "default/migrations/_lock".to_string(),
                holder: "ci@runner-1".to_string(),
            },
            MiglockError::MigrationFailed("exit status 3".to_string()),
            MiglockError::LockLost("expired".to_string()),
        ];

        for err in &errors {
            assert_eq!(err.exit_code(), exit_codes::GENERAL_ERROR, "{err}");
        }
    }

    #[test]
    fn already_running_is_distinguishable_from_migration_failure() {
        let running = MiglockError::MigrationAlreadyRunning {
            path: "default/migrations/_lock".to_string(),
            holder: "ci@runner-1".to_string(),
        };
        let failed = MiglockError::MigrationFailed("script 0003 exited with 2".to_string());

        assert_eq!(
            running.to_string(),
            "Migration already running: lock 'default/migrations/_lock' is held by ci@runner-1"
        );
        assert_eq!(
            failed.to_string(),
            "Migration failed: script 0003 exited with 2"
        );
    }
}
