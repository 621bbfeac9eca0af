//! Owner identity for lock holders.

use crate::error::{MiglockError, Result};
use chrono::Utc;

/// Environment variable that pins the owner id of a CLI invocation.
pub const OWNER_ENV: &str = "MIGLOCK_OWNER_ID";

/// `user@HOST` for the current process.
pub fn owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// A fresh owner id: `user@HOST:pid:epoch_ms`.
pub fn generate_owner_id() -> String {
    format!(
        "{}:{}:{}",
        owner_string(),
        std::process::id(),
        Utc::now().timestamp_millis()
    )
}

/// Owner ids must be non-empty and free of control characters.
pub fn validate_owner_id(owner_id: &str) -> Result<()> {
    if owner_id.trim().is_empty() {
        return Err(MiglockError::UserError(
            "owner id must not be empty".to_string(),
        ));
    }
    if owner_id.chars().any(char::is_control) {
        return Err(MiglockError::UserError(format!(
            "owner id {:?} contains control characters",
            owner_id
        )));
    }
    Ok(())
}

/// The owner id pinned for this invocation, if any: explicit value, then
/// `MIGLOCK_OWNER_ID`. A blank variable counts as unset.
pub fn configured_owner_id(explicit: Option<&str>) -> Result<Option<String>> {
    if let Some(owner_id) = explicit {
        validate_owner_id(owner_id)?;
        return Ok(Some(owner_id.to_string()));
    }

    match std::env::var(OWNER_ENV) {
        Ok(owner_id) if !owner_id.trim().is_empty() => {
            validate_owner_id(&owner_id)?;
            Ok(Some(owner_id))
        }
        _ => Ok(None),
    }
}

/// Pick the owner id for this invocation: explicit value, then
/// `MIGLOCK_OWNER_ID`, then a generated one.
pub fn resolve_owner_id(explicit: Option<&str>) -> Result<String> {
    Ok(configured_owner_id(explicit)?.unwrap_or_else(generate_owner_id))
}
