use crate::key_generator::{Identifiers, KeyGenerator};
use crate::rate_limit_config::{BucketSet, RateLimiterConfiguration};
use crate::rate_limiter::{RateLimitOutcome, RateLimiter};
use crate::store::BucketStore;
use std::sync::Arc;
use tracing::warn;

/// Rate limiter bound to a validated configuration
#[derive(Clone)]
pub struct Throttler {
    rate_limiter: RateLimiter,
    config: Arc<RateLimiterConfiguration>,
}

impl Throttler {
    pub fn new(
        store: Arc<dyn BucketStore>,
        config: RateLimiterConfiguration,
        keys: KeyGenerator,
    ) -> Self {
        let rate_limiter = RateLimiter::new(store, keys).with_settings(&config.settings);
        Self {
            rate_limiter,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RateLimiterConfiguration {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Buckets that apply to `route`
    pub fn buckets_for(&self, route: &str) -> &BucketSet {
        self.config.resolve(route)
    }

    /// Check a request against the buckets configured for its route.
    ///
    /// A disabled configuration never touches the store. In log-only mode
    /// limited requests are reported as allowed after being logged.
    pub async fn check(&self, route: &str, identifiers: &Identifiers) -> RateLimitOutcome {
        if !self.config.enabled {
            return RateLimitOutcome::Allowed;
        }

        let buckets = self.config.resolve(route);
        let outcome = self
            .rate_limiter
            .rate_limit(route, buckets, identifiers)
            .await;

        match outcome {
            RateLimitOutcome::Limited(bucket) if self.config.settings.log_only => {
                warn!(route, bucket = %bucket, "Rate limit exceeded (log only)");
                RateLimitOutcome::Allowed
            }
            outcome => outcome,
        }
    }

    /// Get throttler health status
    pub async fn health_check(&self) -> HealthStatus {
        let store_error = self.rate_limiter.ping().await.err().map(|e| e.to_string());

        HealthStatus {
            healthy: store_error.is_none(),
            enabled: self.config.enabled,
            log_only: self.config.settings.log_only,
            store_backend: self.rate_limiter.backend_name(),
            store_connected: store_error.is_none(),
            store_error,
            configured_routes: self.config.route_buckets.len(),
        }
    }
}

/// Health status information
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub enabled: bool,
    pub log_only: bool,
    pub store_backend: &'static str,
    pub store_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
    pub configured_routes: usize,
}
