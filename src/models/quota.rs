//! The singleton quota record and its defaults.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Configured cap when the record does not exist yet: 4.5 GiB, leaving
/// headroom inside a 5 GiB hosting tier.
pub const DEFAULT_LIMIT_BYTES: i64 = 4_831_838_208;

/// Current storage usage as persisted in the `quota_state` singleton row.
///
/// `total_bytes` is always recomputed from the tracked collections before a
/// write; it is never maintained as a running counter. `limit_bytes` is only
/// ever changed by an operator, so the store preserves it across usage writes.
#[derive(Serialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct QuotaState {
    pub total_bytes: i64,
    pub limit_bytes: i64,
    pub last_checked: DateTime<Utc>,
    pub warning_email_sent_at: Option<DateTime<Utc>>,
}

impl QuotaState {
    /// State assumed before the singleton row has ever been written.
    pub fn default_state(now: DateTime<Utc>) -> Self {
        Self {
            total_bytes: 0,
            limit_bytes: DEFAULT_LIMIT_BYTES,
            last_checked: now,
            warning_email_sent_at: None,
        }
    }

    /// Usage as a fraction of the limit.
    pub fn usage_ratio(&self) -> f64 {
        ratio(self.total_bytes, self.limit_bytes)
    }
}

/// `total / limit` guarding against a zero or negative limit.
pub fn ratio(total_bytes: i64, limit_bytes: i64) -> f64 {
    if limit_bytes <= 0 {
        return f64::INFINITY;
    }
    total_bytes as f64 / limit_bytes as f64
}
