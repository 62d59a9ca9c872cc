use crate::rate_limit_config::BucketType;
use crate::rate_limiter::RateLimitOutcome;
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResponse {
    pub limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<BucketType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateLimitResponse {
    pub fn allowed() -> Self {
        Self {
            limited: false,
            bucket: None,
            retry_after: None,
        }
    }

    /// `retry_after` is in whole seconds.
    pub fn denied(bucket: BucketType, retry_after: u64) -> Self {
        Self {
            limited: true,
            bucket: Some(bucket),
            retry_after: Some(retry_after),
        }
    }

    /// Build a response; `refill_ms` gives the time until the next token.
    pub fn from_outcome(outcome: RateLimitOutcome, refill_ms: impl Fn(BucketType) -> u64) -> Self {
        match outcome {
            RateLimitOutcome::Allowed => Self::allowed(),
            RateLimitOutcome::Limited(bucket) => {
                Self::denied(bucket, refill_ms(bucket).div_ceil(1000).max(1))
            }
        }
    }
}
