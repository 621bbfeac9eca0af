//! The lock record stored at the lock path and its display view.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The single record held at the lock path.
///
/// Wire format (timestamps are epoch milliseconds):
///
/// ```json
/// { "ownerId": "ci@runner-1:4242:1700000000000", "acquiredAt": 1700000000000, "expiresAt": 1700000600000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Opaque identifier of the holding instance.
    pub owner_id: String,

    /// When the lock was taken, by the acquirer's clock.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub acquired_at: DateTime<Utc>,

    /// `acquired_at + timeout`.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    /// Create a record acquired at `now`, truncated to the millisecond
    /// precision of the wire format.
    pub fn new(owner_id: impl Into<String>, now: DateTime<Utc>, timeout: TimeDelta) -> Self {
        let acquired_at = now.trunc_subsecs(3);
        Self {
            owner_id: owner_id.into(),
            acquired_at,
            expires_at: acquired_at + timeout,
        }
    }

    /// Decode a record from a stored JSON value.
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        Self::deserialize(value)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// A record is expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
    }

    /// Valid and owned by `owner_id`.
    pub fn is_held_by(&self, owner_id: &str, now: DateTime<Utc>) -> bool {
        self.owner_id == owner_id && self.is_valid(now)
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        (self.expires_at - now).max(TimeDelta::zero())
    }

    /// Same owner and acquisition time, expiry pushed to `now + timeout`.
    pub fn renewed(&self, now: DateTime<Utc>, timeout: TimeDelta) -> Self {
        Self {
            owner_id: self.owner_id.clone(),
            acquired_at: self.acquired_at,
            expires_at: now.trunc_subsecs(3) + timeout,
        }
    }
}

/// Status view of a valid lock, as reported by `get_lock_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    #[serde(flatten)]
    pub record: LockRecord,

    /// Always `true`; kept for display consumers that expect the flag.
    pub is_locked: bool,
}

impl From<LockRecord> for LockStatus {
    fn from(record: LockRecord) -> Self {
        Self {
            record,
            is_locked: true,
        }
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "locked by {} (acquired {}, expires {})",
            self.record.owner_id,
            self.record.acquired_at.to_rfc3339(),
            self.record.expires_at.to_rfc3339()
        )
    }
}

/// Format a duration as a short human-readable string (`2d 3h`, `4h 10m`,
/// `9m 59s`, `12s`).
pub fn format_duration(delta: TimeDelta) -> String {
    let seconds = delta.num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
