//! Key-value store seam used by the rate limiter.

use crate::error::{ThrottlerError, ThrottlerResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Raw state of one key as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredBucket {
    pub value: Option<String>,
    /// `None` when the key is missing or has no expiry.
    pub remaining_ttl_ms: Option<u64>,
}

/// A value to set together with the expiry to reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketWrite {
    pub key: String,
    pub value: String,
    pub expire_secs: u64,
}

/// Batched access to the shared store.
///
/// Each call is one round trip. Implementations only need GET, PTTL, SET and
/// EXPIRE semantics; no atomicity across keys is expected.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Value and remaining TTL for every key, in the order given.
    async fn read_batch(&self, keys: &[String]) -> ThrottlerResult<Vec<StoredBucket>>;

    /// Set every value and reset its expiry.
    async fn write_batch(&self, writes: &[BucketWrite]) -> ThrottlerResult<()>;

    async fn ping(&self) -> ThrottlerResult<()>;

    fn backend_name(&self) -> &'static str;
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// How often writes sweep expired keys out of a [`MemoryStore`].
pub const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, MemoryEntry>,
    next_sweep: Option<Instant>,
}

impl MemoryState {
    /// Drop every expired key, at most once per sweep interval.
    fn sweep_expired(&mut self, now: Instant) {
        if self.next_sweep.is_some_and(|at| now < at) {
            return;
        }
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.next_sweep = Some(now + MEMORY_SWEEP_INTERVAL);
    }
}

/// In-process store with expiring keys.
///
/// Expiry follows the tokio clock so paused-time tests can advance it.
/// Expired keys are dropped when read and swept out on write, so keys that
/// are never seen again do not accumulate.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value and remaining TTL of a key, if it has not expired.
    pub fn snapshot(&self, key: &str) -> Option<(String, u64)> {
        let mut state = self.state.lock().ok()?;
        Self::live_entry(&mut state.entries, key, Instant::now())
            .map(|(value, ttl)| (value.to_string(), ttl))
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.state
            .lock()
            .map(|state| state.entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a value directly, bypassing the limiter.
    pub fn insert_raw(&self, key: &str, value: &str, expire_secs: u64) -> ThrottlerResult<()> {
        let mut state = self.lock()?;
        state.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(expire_secs),
            },
        );
        Ok(())
    }

    fn lock(&self) -> ThrottlerResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| ThrottlerError::Internal("Failed to acquire memory store lock".into()))
    }

    fn live_entry<'a>(
        entries: &'a mut HashMap<String, MemoryEntry>,
        key: &str,
        now: Instant,
    ) -> Option<(&'a str, u64)> {
        let expired = entries.get(key).map(|e| e.expires_at <= now)?;
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| {
            let ttl = entry.expires_at.saturating_duration_since(now).as_millis() as u64;
            (entry.value.as_str(), ttl)
        })
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn read_batch(&self, keys: &[String]) -> ThrottlerResult<Vec<StoredBucket>> {
        let now = Instant::now();
        let mut state = self.lock()?;

        let buckets = keys
            .iter()
            .map(|key| match Self::live_entry(&mut state.entries, key, now) {
                Some((value, ttl)) => StoredBucket {
                    value: Some(value.to_string()),
                    remaining_ttl_ms: Some(ttl),
                },
                None => StoredBucket::default(),
            })
            .collect();

        Ok(buckets)
    }

    async fn write_batch(&self, writes: &[BucketWrite]) -> ThrottlerResult<()> {
        let now = Instant::now();
        let mut state = self.lock()?;
        state.sweep_expired(now);

        for write in writes {
            state.entries.insert(
                write.key.clone(),
                MemoryEntry {
                    value: write.value.clone(),
                    expires_at: now + Duration::from_secs(write.expire_secs),
                },
            );
        }

        Ok(())
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        self.lock().map(|_| ())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
