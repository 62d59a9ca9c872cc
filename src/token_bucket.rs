//! Lazy token bucket evaluation.
//!
//! There is no refill process and no timestamp in the stored record. Every
//! write resets the key's expiry to `maximum_time_before_expiry`, so the time
//! since the last write is the configured window minus the TTL the store
//! still reports:
//!
//! ```text
//! elapsed_ms = maximum_time_before_expiry * 1000 - remaining_ttl_ms
//! ```
//!
//! Tokens accrued during `elapsed_ms` are added on read, capped at capacity.

use crate::rate_limit_config::BucketConfiguration;
use serde::{Deserialize, Serialize};

/// Persisted state of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRecord {
    pub tokens: u64,
    /// Seconds, also used as the key's expiry.
    pub maximum_time_before_expiry: u64,
}

/// A record read back from the store together with its remaining TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingBucket {
    pub record: BucketRecord,
    pub remaining_ttl_ms: u64,
}

impl ExistingBucket {
    /// Milliseconds since the record was last written.
    pub fn elapsed_ms(&self) -> u64 {
        self.record
            .maximum_time_before_expiry
            .saturating_mul(1000)
            .saturating_sub(self.remaining_ttl_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub allowed: bool,
    pub record: BucketRecord,
}

/// Consume one token from a bucket.
///
/// A missing bucket starts full and pays for this request. A rejected
/// request keeps the refilled count and consumes nothing.
pub fn evaluate(existing: Option<&ExistingBucket>, config: &BucketConfiguration) -> Evaluation {
    let ttl = config.maximum_time_before_token_expiry;

    let Some(existing) = existing else {
        return Evaluation {
            allowed: true,
            record: BucketRecord {
                tokens: config.capacity.saturating_sub(1),
                maximum_time_before_expiry: ttl,
            },
        };
    };

    let accumulated = existing.elapsed_ms() / config.add_token_ms.max(1);
    let available = existing
        .record
        .tokens
        .saturating_add(accumulated)
        .min(config.capacity);

    match available.checked_sub(1) {
        Some(remaining) => Evaluation {
            allowed: true,
            record: BucketRecord {
                tokens: remaining,
                maximum_time_before_expiry: ttl,
            },
        },
        None => Evaluation {
            allowed: false,
            record: BucketRecord {
                tokens: available,
                maximum_time_before_expiry: ttl,
            },
        },
    }
}
