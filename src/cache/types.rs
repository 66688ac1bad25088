use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::relay::types::Answer;

/// Stored form of a cached answer, `{ts, value}` with `ts` in unix millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub ts: i64,
    pub value: Answer,
}

impl CacheEntry {
    pub fn new(value: Answer, now: DateTime<Utc>) -> Self {
        Self {
            ts: now.timestamp_millis(),
            value,
        }
    }
}

/// How long entries stay readable. Failed answers use `error_ttl`.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    pub ttl: Duration,
    pub error_ttl: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(24),
            error_ttl: Duration::minutes(5),
        }
    }
}

impl TtlPolicy {
    pub fn ttl_for(&self, value: &Answer) -> Duration {
        if value.failed {
            self.error_ttl
        } else {
            self.ttl
        }
    }

    /// `now - ts < ttl`.
    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() - entry.ts < self.ttl_for(&entry.value).num_milliseconds()
    }
}
