//! Exit code constants for the miglock CLI.
//!
//! - 0: Success
//! - 1: General error (bad args, invalid config, migration already running,
//!   migration command failed, lock lost mid-run)
//! - 7: Store connection failure

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error: anything that is not a store connection failure.
pub const GENERAL_ERROR: i32 = 1;

/// The backing store could not be reached.
pub const STORE_CONNECTION_ERROR: i32 = 7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, GENERAL_ERROR, STORE_CONNECTION_ERROR];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn exit_codes_have_documented_values() {
        assert_eq!(SUCCESS, 0);
        assert_eq!(GENERAL_ERROR, 1);
        assert_eq!(STORE_CONNECTION_ERROR, 7);
    }
}
