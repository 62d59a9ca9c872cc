use crate::error::ThrottlerError;
use crate::rate_limit_config::{BucketSet, RateLimiterConfiguration};
use regex::Regex;
use std::sync::LazyLock;
use validator::Validate;

/// Routes and namespaces become part of storage keys.
static KEY_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s]{1,128}$").expect("key segment pattern is valid"));

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), ThrottlerError> {
        if url.is_empty() {
            return Err(ThrottlerError::Configuration(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(ThrottlerError::Configuration(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_key_segment(segment: &str) -> bool {
        KEY_SEGMENT.is_match(segment)
    }

    /// Validates a segment that ends up inside a storage key
    pub fn validate_key_segment(kind: &str, segment: &str) -> Result<(), ThrottlerError> {
        if Self::is_key_segment(segment) {
            Ok(())
        } else {
            Err(ThrottlerError::Configuration(format!(
                "Invalid {} '{}': must be 1-128 characters without whitespace",
                kind, segment
            )))
        }
    }

    /// Validates a full rate limiter configuration document.
    ///
    /// Every declared bucket needs a positive capacity, refill interval and
    /// expiry; every route name must be usable inside a storage key.
    pub fn validate_rate_limiter_config(
        config: &RateLimiterConfiguration,
    ) -> Result<(), ThrottlerError> {
        config.default_buckets.validate().map_err(|e| {
            ThrottlerError::Configuration(format!("defaultBuckets: {}", e))
        })?;

        for (route, buckets) in &config.route_buckets {
            Self::validate_key_segment("route", route)?;
            buckets.validate().map_err(|e| {
                ThrottlerError::Configuration(format!("routeBuckets.{}: {}", route, e))
            })?;
        }

        if config.settings.store_timeout.is_zero() {
            return Err(ThrottlerError::Configuration(
                "settings.storeTimeout must be greater than 0".to_string(),
            ));
        }

        for warning in Self::expiry_warnings(config) {
            tracing::warn!("{}", warning);
        }

        Ok(())
    }

    /// Buckets whose keys expire before one token is added back.
    ///
    /// Such a bucket resets to full capacity after every idle period shorter
    /// than its refill interval, which is allowed but rarely intended.
    pub fn expiry_warnings(config: &RateLimiterConfiguration) -> Vec<String> {
        let mut sets: Vec<(String, &BucketSet)> =
            vec![("defaultBuckets".to_string(), &config.default_buckets)];
        let mut routes: Vec<_> = config.route_buckets.iter().collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));
        sets.extend(
            routes
                .into_iter()
                .map(|(route, buckets)| (format!("routeBuckets.{}", route), buckets)),
        );

        sets.into_iter()
            .flat_map(|(path, buckets)| {
                buckets
                    .declared()
                    .filter(|(_, bucket)| bucket.expires_before_refill())
                    .map(move |(bucket_type, bucket)| {
                        format!(
                            "{}.{}: maximumTimeBeforeTokenExpiry ({}s) is shorter than addTokenMs ({}ms); idle buckets reset to full capacity",
                            path,
                            bucket_type,
                            bucket.maximum_time_before_token_expiry,
                            bucket.add_token_ms
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
