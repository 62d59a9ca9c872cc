//! Storage key derivation for rate limit buckets.

use crate::rate_limit_config::{BucketSet, BucketType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_NAMESPACE: &str = "gw-rl";

/// Identifying values of a request, one per bucket dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub okta_identifier: Option<String>,
}

impl Identifiers {
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_okta_identifier(mut self, id: impl Into<String>) -> Self {
        self.okta_identifier = Some(id.into());
        self
    }

    /// Value identifying the request along `bucket_type`.
    ///
    /// Blank values count as missing. `Global` has no identifier.
    pub fn value_for(&self, bucket_type: BucketType) -> Option<&str> {
        let value = match bucket_type {
            BucketType::Global => return None,
            BucketType::Ip => self.ip.as_deref(),
            BucketType::Email => self.email.as_deref(),
            BucketType::AccessToken => self.access_token.as_deref(),
            BucketType::OktaIdentifier => self.okta_identifier.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

/// A bucket that applies to the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketKey {
    pub bucket_type: BucketType,
    pub key: String,
}

/// Builds `<namespace>-<route>-<bucketType>[-<sha256(value)>]` keys
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    namespace: String,
}

impl KeyGenerator {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key for one bucket, or `None` when the request lacks the identifier.
    pub fn generate_key(
        &self,
        route: &str,
        bucket_type: BucketType,
        identifiers: &Identifiers,
    ) -> Option<String> {
        match bucket_type {
            BucketType::Global => Some(format!("{}-{}-{}", self.namespace, route, bucket_type)),
            _ => identifiers.value_for(bucket_type).map(|value| {
                format!(
                    "{}-{}-{}-{}",
                    self.namespace,
                    route,
                    bucket_type,
                    Self::hash_identifier(value)
                )
            }),
        }
    }

    /// Keys for every bucket of `buckets` that applies, in precedence order.
    pub fn applicable_keys(
        &self,
        route: &str,
        buckets: &BucketSet,
        identifiers: &Identifiers,
    ) -> Vec<BucketKey> {
        BucketType::PRECEDENCE
            .iter()
            .filter(|bucket_type| buckets.get(**bucket_type).is_some())
            .filter_map(|&bucket_type| {
                self.generate_key(route, bucket_type, identifiers)
                    .map(|key| BucketKey { bucket_type, key })
            })
            .collect()
    }

    /// One-way pseudonym so raw identifiers never reach the store.
    pub fn hash_identifier(value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}
