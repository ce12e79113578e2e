use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use redis::Client;
use std::time::Duration;

use crate::db::cache::CacheBackend;
use crate::error::AppResult;

const KEY_PREFIX: &str = "mlt:";

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> AppResult<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// External TTL store backend
///
/// Expiry is delegated to Redis via `SET EX`; capacity is whatever the
/// server's eviction policy allows.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisBackend {
    /// Connects to Redis, reusing one multiplexed connection for all commands
    pub async fn connect(redis_url: &str, ttl: Duration) -> AppResult<Self> {
        let client = create_redis_client(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!(ttl_secs = ttl.as_secs(), "Connected to Redis cache");

        Ok(Self {
            conn,
            ttl_secs: ttl.as_secs().max(1),
        })
    }

    fn namespaced(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisBackend {
    async fn get_raw(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(Self::namespaced(key)).await?;
        Ok(cached)
    }

    async fn set_raw(&self, key: &str, value: String) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::namespaced(key), value, self.ttl_secs)
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
