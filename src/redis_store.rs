use crate::error::{ThrottlerError, ThrottlerResult};
use crate::store::{BucketStore, BucketWrite, StoredBucket};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Redis-backed bucket store.
///
/// The connection is opened on first use and shared through a
/// [`ConnectionManager`], which reconnects on its own after the server drops
/// it. Each batch sends a single non-transactional pipeline.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: Arc<OnceCell<ConnectionManager>>,
}

impl RedisStore {
    /// Parse the URL without touching the network.
    pub fn new(redis_url: &str) -> ThrottlerResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            ThrottlerError::Configuration(format!("Invalid Redis URL: {}", e))
        })?;

        Ok(Self {
            client,
            connection: Arc::new(OnceCell::new()),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    /// Shared connection, established on first call.
    ///
    /// A failed or cancelled attempt leaves the cell empty so the next call
    /// tries again.
    async fn connection(&self) -> ThrottlerResult<ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await.map_err(|e| {
                    ThrottlerError::Redis(format!("Failed to connect to Redis: {}", e))
                })?;
                tracing::info!("Redis connection established");
                Ok::<_, ThrottlerError>(manager)
            })
            .await?;

        Ok(manager.clone())
    }
}

fn decode_pair(value: &Value, pttl: &Value) -> ThrottlerResult<StoredBucket> {
    let value: Option<Vec<u8>> = redis::from_redis_value(value)?;
    let pttl: i64 = redis::from_redis_value(pttl)?;

    Ok(StoredBucket {
        value: value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
        // -2 missing key, -1 no expiry
        remaining_ttl_ms: u64::try_from(pttl).ok(),
    })
}

#[async_trait]
impl BucketStore for RedisStore {
    async fn read_batch(&self, keys: &[String]) -> ThrottlerResult<Vec<StoredBucket>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("GET").arg(key).cmd("PTTL").arg(key);
        }

        let mut conn = self.connection().await?;
        let values: Vec<Value> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| ThrottlerError::Redis(format!("Pipelined read failed: {}", e)))?;

        if values.len() != keys.len() * 2 {
            return Err(ThrottlerError::Redis(format!(
                "Expected {} replies, got {}",
                keys.len() * 2,
                values.len()
            )));
        }

        values
            .chunks_exact(2)
            .map(|pair| decode_pair(&pair[0], &pair[1]))
            .collect()
    }

    async fn write_batch(&self, writes: &[BucketWrite]) -> ThrottlerResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for write in writes {
            pipe.cmd("SET")
                .arg(&write.key)
                .arg(&write.value)
                .ignore()
                .cmd("EXPIRE")
                .arg(&write.key)
                .arg(write.expire_secs)
                .ignore();
        }

        let mut conn = self.connection().await?;
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| ThrottlerError::Redis(format!("Pipelined write failed: {}", e)))?;

        Ok(())
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ThrottlerError::Redis(format!("Ping failed: {}", e)))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
