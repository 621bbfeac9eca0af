//! `lock:status` and `lock:release`.

use super::CommandContext;
use crate::cli::{LockReleaseArgs, LockStatusArgs};
use crate::clock::Clock;
use crate::error::{MiglockError, Result};
use crate::locks::{LockStatus, LockingService, format_duration};
use crate::store::StorePath;
use chrono::{DateTime, Utc};

pub fn cmd_lock_status(ctx: &CommandContext, args: LockStatusArgs) -> Result<()> {
    let service = ctx.locking_service(ctx.open_store()?)?;
    println!("{}", status_report(&service, args.json)?);
    Ok(())
}

pub fn cmd_lock_release(ctx: &CommandContext, args: LockReleaseArgs) -> Result<()> {
    let service = ctx.locking_service(ctx.open_store()?)?;
    let message = if args.force {
        force_release(&service)?
    } else {
        release(&service, &ctx.explicit_owner_id("lock:release")?)?
    };
    println!("{}", message);
    Ok(())
}

/// Status text as printed by `lock:status`.
pub(super) fn status_report(service: &LockingService, json: bool) -> Result<String> {
    let status = service.get_lock_status()?;

    if json {
        return serde_json::to_string_pretty(&status).map_err(|e| {
            MiglockError::UserError(format!("failed to serialize lock status: {}", e))
        });
    }

    Ok(render_status(
        service.lock_path(),
        status.as_ref(),
        service.clock().now(),
    ))
}

/// Human-readable status for `path`.
pub(super) fn render_status(
    path: &StorePath,
    status: Option<&LockStatus>,
    now: DateTime<Utc>,
) -> String {
    let Some(status) = status else {
        return "unlocked".to_string();
    };
    let record = &status.record;

    let mut out = String::new();
    out.push_str(&format!("Lock:       {}\n", path));
    out.push_str(&format!("Owner:      {}\n", record.owner_id));
    out.push_str(&format!(
        "Acquired:   {}\n",
        record.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "Expires:    {} (in {})",
        record.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
        format_duration(record.remaining(now))
    ));
    out
}

pub(super) fn force_release(service: &LockingService) -> Result<String> {
    service.force_release_lock()?;
    Ok(format!("Lock '{}' force-released.", service.lock_path()))
}

/// Release on behalf of `owner_id`.
///
/// Releasing a lock held by someone else is not an error; the message says
/// so and points at `--force`.
pub(super) fn release(service: &LockingService, owner_id: &str) -> Result<String> {
    if !service.verify_lock_ownership(owner_id)? {
        // Still call release so an expired record of our own is cleaned up.
        service.release_lock(owner_id)?;
        return Ok(format!(
            "Lock '{}' is not held by '{}'; nothing to release.\n\
             Use `miglock lock:release --force` to remove it regardless of owner.",
            service.lock_path(),
            owner_id
        ));
    }

    service.release_lock(owner_id)?;
    Ok(format!("Lock '{}' released.", service.lock_path()))
}
