use crate::batch::{read_buckets, WriteBatch};
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::key_generator::{Identifiers, KeyGenerator};
use crate::rate_limit_config::{BucketSet, BucketType, FailurePolicy, Settings};
use crate::store::BucketStore;
use crate::token_bucket::evaluate;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Result of checking a request against its buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "bucket", rename_all = "camelCase")]
pub enum RateLimitOutcome {
    Allowed,
    /// Rejected by the first exhausted bucket in precedence order.
    Limited(BucketType),
}

impl RateLimitOutcome {
    pub fn is_limited(&self) -> bool {
        matches!(self, RateLimitOutcome::Limited(_))
    }

    pub fn limited_by(&self) -> Option<BucketType> {
        match self {
            RateLimitOutcome::Allowed => None,
            RateLimitOutcome::Limited(bucket) => Some(*bucket),
        }
    }
}

/// Multi-bucket token bucket limiter over a shared store
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
    keys: KeyGenerator,
    store_timeout: Duration,
    failure_policy: FailurePolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn BucketStore>, keys: KeyGenerator) -> Self {
        let settings = Settings::default();
        Self {
            store,
            keys,
            store_timeout: settings.store_timeout,
            failure_policy: settings.failure_policy,
        }
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.store_timeout = settings.store_timeout;
        self.failure_policy = settings.failure_policy;
        self
    }

    pub fn key_generator(&self) -> &KeyGenerator {
        &self.keys
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Check and consume one token from every applicable bucket.
    ///
    /// Store failures never surface: they are logged and resolved by the
    /// configured failure policy.
    pub async fn rate_limit(
        &self,
        route: &str,
        buckets: &BucketSet,
        identifiers: &Identifiers,
    ) -> RateLimitOutcome {
        match self.try_rate_limit(route, buckets, identifiers).await {
            Ok(outcome) => outcome,
            Err(e) => self.on_failure(route, &e),
        }
    }

    /// Like [`rate_limit`](Self::rate_limit) but reports read failures.
    ///
    /// Buckets are evaluated in [`BucketType::PRECEDENCE`] order and the
    /// walk stops at the first rejection, leaving later buckets untouched.
    /// A failed write is logged and does not change the decision.
    pub async fn try_rate_limit(
        &self,
        route: &str,
        buckets: &BucketSet,
        identifiers: &Identifiers,
    ) -> ThrottlerResult<RateLimitOutcome> {
        let keys = self.keys.applicable_keys(route, buckets, identifiers);
        let existing = self.bounded(read_buckets(self.store.as_ref(), &keys)).await?;

        let mut batch = WriteBatch::new();
        let mut outcome = RateLimitOutcome::Allowed;

        for (bucket_key, existing) in keys.iter().zip(&existing) {
            let Some(config) = buckets.get(bucket_key.bucket_type) else {
                continue;
            };

            let evaluation = evaluate(existing.as_ref(), config);
            batch.queue(&bucket_key.key, &evaluation.record)?;

            debug!(
                route,
                bucket = %bucket_key.bucket_type,
                allowed = evaluation.allowed,
                tokens = evaluation.record.tokens,
                "Evaluated bucket"
            );

            if !evaluation.allowed {
                outcome = RateLimitOutcome::Limited(bucket_key.bucket_type);
                break;
            }
        }

        if let Err(e) = self.bounded(batch.flush(self.store.as_ref())).await {
            error!(route, error = %e, "Failed to persist bucket updates");
        }

        if let RateLimitOutcome::Limited(bucket) = outcome {
            info!(route, bucket = %bucket, "Request rate limited");
        }

        Ok(outcome)
    }

    pub async fn ping(&self) -> ThrottlerResult<()> {
        self.bounded(self.store.ping()).await
    }

    fn on_failure(&self, route: &str, err: &ThrottlerError) -> RateLimitOutcome {
        let outcome = match self.failure_policy {
            FailurePolicy::Open => RateLimitOutcome::Allowed,
            FailurePolicy::Closed => RateLimitOutcome::Limited(BucketType::Global),
        };
        error!(
            route,
            error = %err,
            policy = ?self.failure_policy,
            "Rate limiter store unavailable"
        );
        outcome
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = ThrottlerResult<T>>,
    ) -> ThrottlerResult<T> {
        tokio::time::timeout(self.store_timeout, operation)
            .await
            .map_err(|_| ThrottlerError::StoreTimeout(self.store_timeout))?
    }
}
