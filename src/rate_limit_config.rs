use crate::config_validator::ConfigValidator;
use crate::error::{ThrottlerError, ThrottlerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Seconds an idle bucket record lives in the store when not configured.
pub const DEFAULT_TOKEN_EXPIRY_SECS: u64 = 60;

/// One dimension a request can be limited along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BucketType {
    Global,
    Ip,
    Email,
    AccessToken,
    OktaIdentifier,
}

impl BucketType {
    /// Evaluation order. Most specific identity first, global ceiling last.
    pub const PRECEDENCE: [BucketType; 5] = [
        BucketType::OktaIdentifier,
        BucketType::Email,
        BucketType::Ip,
        BucketType::AccessToken,
        BucketType::Global,
    ];

    /// Tag used in storage keys and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketType::Global => "global",
            BucketType::Ip => "ip",
            BucketType::Email => "email",
            BucketType::AccessToken => "accessToken",
            BucketType::OktaIdentifier => "oktaIdentifier",
        }
    }
}

impl fmt::Display for BucketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capacity and refill parameters of a single bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BucketConfiguration {
    #[validate(range(min = 1, message = "capacity must be greater than 0"))]
    pub capacity: u64,
    #[validate(range(min = 1, message = "addTokenMs must be greater than 0"))]
    pub add_token_ms: u64,
    #[serde(default = "default_token_expiry")]
    #[validate(range(min = 1, message = "maximumTimeBeforeTokenExpiry must be greater than 0"))]
    pub maximum_time_before_token_expiry: u64,
}

fn default_token_expiry() -> u64 {
    DEFAULT_TOKEN_EXPIRY_SECS
}

impl BucketConfiguration {
    pub fn new(capacity: u64, add_token_ms: u64) -> Self {
        Self {
            capacity,
            add_token_ms,
            maximum_time_before_token_expiry: DEFAULT_TOKEN_EXPIRY_SECS,
        }
    }

    pub fn with_expiry(mut self, seconds: u64) -> Self {
        self.maximum_time_before_token_expiry = seconds;
        self
    }

    /// True when an idle bucket's key expires before a single token is added,
    /// so the bucket can only ever be seen full or freshly written.
    pub fn expires_before_refill(&self) -> bool {
        self.maximum_time_before_token_expiry.saturating_mul(1000) < self.add_token_ms
    }
}

/// The buckets that apply to a route. Only `global` is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BucketSet {
    #[serde(alias = "global")]
    #[validate(nested)]
    pub global_bucket: BucketConfiguration,
    #[serde(default, alias = "ip", skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub ip_bucket: Option<BucketConfiguration>,
    #[serde(default, alias = "email", skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub email_bucket: Option<BucketConfiguration>,
    #[serde(default, alias = "accessToken", skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub access_token_bucket: Option<BucketConfiguration>,
    #[serde(default, alias = "oktaIdentifier", skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub okta_identifier_bucket: Option<BucketConfiguration>,
}

impl BucketSet {
    /// A set with only the mandatory global bucket.
    pub fn global(config: BucketConfiguration) -> Self {
        Self {
            global_bucket: config,
            ip_bucket: None,
            email_bucket: None,
            access_token_bucket: None,
            okta_identifier_bucket: None,
        }
    }

    pub fn with_bucket(mut self, bucket_type: BucketType, config: BucketConfiguration) -> Self {
        match bucket_type {
            BucketType::Global => self.global_bucket = config,
            BucketType::Ip => self.ip_bucket = Some(config),
            BucketType::Email => self.email_bucket = Some(config),
            BucketType::AccessToken => self.access_token_bucket = Some(config),
            BucketType::OktaIdentifier => self.okta_identifier_bucket = Some(config),
        }
        self
    }

    /// Configuration for a bucket type, if the set declares it
    pub fn get(&self, bucket_type: BucketType) -> Option<&BucketConfiguration> {
        match bucket_type {
            BucketType::Global => Some(&self.global_bucket),
            BucketType::Ip => self.ip_bucket.as_ref(),
            BucketType::Email => self.email_bucket.as_ref(),
            BucketType::AccessToken => self.access_token_bucket.as_ref(),
            BucketType::OktaIdentifier => self.okta_identifier_bucket.as_ref(),
        }
    }

    /// Refill interval of a bucket type, or the global bucket's when the set
    /// does not declare that type.
    pub fn refill_interval_ms(&self, bucket_type: BucketType) -> u64 {
        self.get(bucket_type)
            .unwrap_or(&self.global_bucket)
            .add_token_ms
    }

    /// Declared buckets in precedence order.
    pub fn declared(&self) -> impl Iterator<Item = (BucketType, &BucketConfiguration)> + '_ {
        BucketType::PRECEDENCE
            .iter()
            .filter_map(|bucket_type| self.get(*bucket_type).map(|config| (*bucket_type, config)))
    }
}

/// What to report when the store cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    /// Let the request through.
    #[default]
    Open,
    /// Reject the request as limited by the global bucket.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Log limited requests without rejecting them.
    #[serde(default)]
    pub log_only: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_store_timeout", with = "humantime_serde")]
    pub store_timeout: Duration,
}

fn default_store_timeout() -> Duration {
    Duration::from_millis(500)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_only: false,
            failure_policy: FailurePolicy::default(),
            store_timeout: default_store_timeout(),
        }
    }
}

/// Configuration document for the rate limiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterConfiguration {
    pub enabled: bool,
    #[serde(default)]
    pub settings: Settings,
    pub default_buckets: BucketSet,
    #[serde(default)]
    pub route_buckets: HashMap<String, BucketSet>,
}

impl RateLimiterConfiguration {
    pub fn new(default_buckets: BucketSet) -> Self {
        Self {
            enabled: true,
            settings: Settings::default(),
            default_buckets,
            route_buckets: HashMap::new(),
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(document: &str) -> ThrottlerResult<Self> {
        let config: Self = serde_json::from_str(document).map_err(|e| {
            ThrottlerError::Configuration(format!("Invalid rate limiter configuration: {}", e))
        })?;
        ConfigValidator::validate_rate_limiter_config(&config)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ThrottlerResult<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| {
            ThrottlerError::Configuration(format!(
                "Failed to read rate limiter configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&document)
    }

    /// Bucket set for a route, falling back to the defaults.
    ///
    /// Route sets replace the defaults wholesale; fields are never merged.
    pub fn resolve(&self, route: &str) -> &BucketSet {
        self.route_buckets.get(route).unwrap_or(&self.default_buckets)
    }

    pub fn set_route(&mut self, route: impl Into<String>, buckets: BucketSet) {
        self.route_buckets.insert(route.into(), buckets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "enabled": true,
        "settings": { "logOnly": true, "failurePolicy": "closed", "storeTimeout": "250ms" },
        "defaultBuckets": {
            "globalBucket": { "capacity": 500, "addTokenMs": 50 },
            "ipBucket": { "capacity": 100, "addTokenMs": 50, "maximumTimeBeforeTokenExpiry": 300 },
            "emailBucket": { "capacity": 10, "addTokenMs": 1000 }
        },
        "routeBuckets": {
            "/signin": {
                "globalBucket": { "capacity": 50, "addTokenMs": 100 },
                "ipBucket": { "capacity": 5, "addTokenMs": 1000 }
            }
        }
    }"#;

    #[test]
    fn test_parse_document() {
        let config = RateLimiterConfiguration::from_json(DOCUMENT).unwrap();
        assert!(config.enabled);
        assert!(config.settings.log_only);
        assert_eq!(config.settings.failure_policy, FailurePolicy::Closed);
        assert_eq!(config.settings.store_timeout, Duration::from_millis(250));

        let ip = config.default_buckets.ip_bucket.as_ref().unwrap();
        assert_eq!(ip.maximum_time_before_token_expiry, 300);
        let email = config.default_buckets.email_bucket.as_ref().unwrap();
        assert_eq!(email.maximum_time_before_token_expiry, DEFAULT_TOKEN_EXPIRY_SECS);
    }

    #[test]
    fn test_settings_default_when_omitted() {
        let config = RateLimiterConfiguration::from_json(
            r#"{ "enabled": false, "defaultBuckets": { "global": { "capacity": 1, "addTokenMs": 1 } } }"#,
        )
        .unwrap();
        assert_eq!(config.settings, Settings::default());
        assert!(config.route_buckets.is_empty());
    }

    #[test]
    fn test_route_override_replaces_defaults() {
        let config = RateLimiterConfiguration::from_json(DOCUMENT).unwrap();

        let signin = config.resolve("/signin");
        assert_eq!(signin.global_bucket.capacity, 50);
        assert!(signin.get(BucketType::Ip).is_some());
        assert!(signin.get(BucketType::Email).is_none());

        let register = config.resolve("/register");
        assert_eq!(register, &config.default_buckets);
        assert!(register.get(BucketType::Email).is_some());
    }

    #[test]
    fn test_short_bucket_names_are_accepted() {
        let set: BucketSet = serde_json::from_str(
            r#"{ "global": { "capacity": 3, "addTokenMs": 10 }, "accessToken": { "capacity": 2, "addTokenMs": 10 } }"#,
        )
        .unwrap();
        assert_eq!(set.get(BucketType::AccessToken).unwrap().capacity, 2);
    }

    #[test]
    fn test_missing_global_bucket_is_rejected() {
        let result = RateLimiterConfiguration::from_json(
            r#"{ "enabled": true, "defaultBuckets": { "ipBucket": { "capacity": 1, "addTokenMs": 1 } } }"#,
        );
        assert!(matches!(result, Err(ThrottlerError::Configuration(_))));
    }

    #[test]
    fn test_missing_add_token_ms_is_rejected() {
        let result = RateLimiterConfiguration::from_json(
            r#"{ "enabled": true, "defaultBuckets": { "globalBucket": { "capacity": 1 } } }"#,
        );
        assert!(matches!(result, Err(ThrottlerError::Configuration(_))));
    }

    #[test]
    fn test_precedence_order() {
        assert_eq!(BucketType::PRECEDENCE[0], BucketType::OktaIdentifier);
        assert_eq!(BucketType::PRECEDENCE[4], BucketType::Global);
        assert_eq!(BucketType::AccessToken.to_string(), "accessToken");
    }

    #[test]
    fn test_expires_before_refill() {
        assert!(BucketConfiguration::new(5, 120_000).with_expiry(60).expires_before_refill());
        assert!(!BucketConfiguration::new(5, 60_000).with_expiry(60).expires_before_refill());
        assert!(!BucketConfiguration::new(5, 1000).expires_before_refill());
        assert!(!BucketConfiguration::new(5, 1).with_expiry(u64::MAX).expires_before_refill());
    }

    #[test]
    fn test_refill_interval_falls_back_to_global() {
        let set = BucketSet::global(BucketConfiguration::new(100, 250))
            .with_bucket(BucketType::Ip, BucketConfiguration::new(1, 2500));

        assert_eq!(set.refill_interval_ms(BucketType::Ip), 2500);
        assert_eq!(set.refill_interval_ms(BucketType::Email), 250);
        assert_eq!(set.refill_interval_ms(BucketType::Global), 250);
    }

    #[test]
    fn test_declared_buckets_in_precedence_order() {
        let set = BucketSet::global(BucketConfiguration::new(100, 250))
            .with_bucket(BucketType::Ip, BucketConfiguration::new(1, 2500))
            .with_bucket(BucketType::OktaIdentifier, BucketConfiguration::new(1, 10));

        let types: Vec<BucketType> = set.declared().map(|(t, _)| t).collect();
        assert_eq!(
            types,
            vec![BucketType::OktaIdentifier, BucketType::Ip, BucketType::Global]
        );
    }
}
