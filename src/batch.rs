//! One round trip in, one round trip out.

use crate::error::{ThrottlerError, ThrottlerResult};
use crate::key_generator::BucketKey;
use crate::store::{BucketStore, BucketWrite, StoredBucket};
use crate::token_bucket::{BucketRecord, ExistingBucket};
use tracing::{debug, warn};

/// Current state of every bucket key, aligned with `keys`.
///
/// Values that fail to decode are reported as missing so the bucket starts
/// over instead of failing the request.
pub async fn read_buckets(
    store: &dyn BucketStore,
    keys: &[BucketKey],
) -> ThrottlerResult<Vec<Option<ExistingBucket>>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let raw_keys: Vec<String> = keys.iter().map(|k| k.key.clone()).collect();
    let stored = store.read_batch(&raw_keys).await?;

    if stored.len() != keys.len() {
        return Err(ThrottlerError::Internal(format!(
            "Store returned {} buckets for {} keys",
            stored.len(),
            keys.len()
        )));
    }

    Ok(keys
        .iter()
        .zip(stored)
        .map(|(key, stored)| match parse_bucket(stored) {
            Ok(existing) => existing,
            Err(e) => {
                warn!(
                    bucket = %key.bucket_type,
                    key = %key.key,
                    error = %e,
                    "Discarding unreadable bucket record"
                );
                None
            }
        })
        .collect())
}

fn parse_bucket(stored: StoredBucket) -> ThrottlerResult<Option<ExistingBucket>> {
    let Some(value) = stored.value else {
        return Ok(None);
    };

    let record: BucketRecord =
        serde_json::from_str(&value).map_err(|e| ThrottlerError::RecordParse(e.to_string()))?;

    // A key without expiry gives no clock; treat it as just written.
    let remaining_ttl_ms = stored
        .remaining_ttl_ms
        .unwrap_or_else(|| record.maximum_time_before_expiry.saturating_mul(1000));

    Ok(Some(ExistingBucket {
        record,
        remaining_ttl_ms,
    }))
}

/// Bucket updates queued during evaluation
#[derive(Debug, Default)]
pub struct WriteBatch {
    writes: Vec<BucketWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, key: &str, record: &BucketRecord) -> ThrottlerResult<()> {
        let value = serde_json::to_string(record)
            .map_err(|e| ThrottlerError::Internal(format!("Failed to encode bucket: {}", e)))?;

        self.writes.push(BucketWrite {
            key: key.to_string(),
            value,
            expire_secs: record.maximum_time_before_expiry,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Send every queued write in a single batch. Returns how many were sent.
    pub async fn flush(self, store: &dyn BucketStore) -> ThrottlerResult<usize> {
        if self.writes.is_empty() {
            return Ok(0);
        }

        store.write_batch(&self.writes).await?;
        debug!(count = self.writes.len(), "Flushed bucket updates");
        Ok(self.writes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit_config::BucketType;
    use crate::store::MemoryStore;

    fn key(bucket_type: BucketType, key: &str) -> BucketKey {
        BucketKey {
            bucket_type,
            key: key.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_mixed_buckets() {
        let store = MemoryStore::new();
        store
            .insert_raw("k-ip", r#"{"tokens":2,"maximumTimeBeforeExpiry":30}"#, 30)
            .unwrap();

        let keys = vec![key(BucketType::Ip, "k-ip"), key(BucketType::Global, "k-global")];
        let buckets = read_buckets(&store, &keys).await.unwrap();

        let ip = buckets[0].unwrap();
        assert_eq!(ip.record.tokens, 2);
        assert_eq!(ip.remaining_ttl_ms, 30_000);
        assert!(buckets[1].is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_record_reads_as_missing() {
        let store = MemoryStore::new();
        store.insert_raw("k-email", "not json", 30).unwrap();

        let buckets = read_buckets(&store, &[key(BucketType::Email, "k-email")])
            .await
            .unwrap();
        assert_eq!(buckets, vec![None]);
    }

    #[test]
    fn test_missing_ttl_means_no_elapsed_time() {
        let existing = parse_bucket(StoredBucket {
            value: Some(r#"{"tokens":0,"maximumTimeBeforeExpiry":10}"#.to_string()),
            remaining_ttl_ms: None,
        })
        .unwrap()
        .unwrap();
        assert_eq!(existing.elapsed_ms(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_and_sets_expiry() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch
            .queue(
                "k-global",
                &BucketRecord {
                    tokens: 4,
                    maximum_time_before_expiry: 20,
                },
            )
            .unwrap();
        assert_eq!(batch.len(), 1);

        assert_eq!(batch.flush(&store).await.unwrap(), 1);
        let (value, ttl) = store.snapshot("k-global").unwrap();
        assert_eq!(value, r#"{"tokens":4,"maximumTimeBeforeExpiry":20}"#);
        assert_eq!(ttl, 20_000);
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let store = MemoryStore::new();
        assert_eq!(WriteBatch::new().flush(&store).await.unwrap(), 0);
        assert!(store.is_empty());
    }
}
