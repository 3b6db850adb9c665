//! Redis counter store - the shared backend for distributed admission.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use gatekeep_core::ports::{CounterStore, StoreError};

/// Redis counter store configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Per-operation timeout; a slow store counts as an unavailable store
    pub op_timeout: Duration,
    /// Key prefix for counter keys
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            op_timeout: Duration::from_millis(500),
            key_prefix: "ratelimit".to_string(),
        }
    }
}

impl RedisStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            op_timeout: Duration::from_millis(
                std::env::var("REDIS_OP_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            key_prefix: std::env::var("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|_| "ratelimit".to_string()),
        }
    }
}

/// Redis-backed counter store.
///
/// Uses a connection manager for automatic reconnection and safe concurrent
/// use; each operation clones a cheap handle, so no connection can leak on an
/// error path. Constructed explicitly and injected, never a process global.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    config: RedisStoreConfig,
    /// Lua script for atomic increment with expiry on first creation
    incr_script: Script,
}

impl RedisCounterStore {
    pub async fn new(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // INCR + EXPIRE must be one atomic step so concurrent first requests
        // cannot leave a counter without a TTL. The expiry is applied only
        // when the increment creates the key.
        let incr_script = Script::new(
            r#"
            local count = redis.call('INCR', KEYS[1])
            if count == 1 then
                redis.call('EXPIRE', KEYS[1], tonumber(ARGV[1]))
            end
            return count
            "#,
        );

        tracing::info!(url = %config.url, "Connected to Redis counter store");

        Ok(Self {
            conn,
            config,
            incr_script,
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(RedisStoreConfig::from_env()).await
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.config.op_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();
        self.bounded(conn.get::<_, Option<u64>>(redis_key)).await
    }

    async fn set(&self, key: &str, value: u64) -> Result<(), StoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();
        self.bounded(conn.set::<_, _, ()>(redis_key, value)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();
        self.bounded(conn.expire::<_, ()>(redis_key, ttl.as_secs() as i64))
            .await
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();
        self.bounded(
            self.incr_script
                .key(&redis_key)
                .arg(ttl.as_secs())
                .invoke_async::<u64>(&mut conn),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get_test_store() -> Option<RedisCounterStore> {
        let config = RedisStoreConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(1),
            op_timeout: Duration::from_millis(500),
            key_prefix: "test_gatekeep".to_string(),
        };

        RedisCounterStore::new(config).await.ok()
    }

    #[tokio::test]
    async fn test_incr_get_and_expiry() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };

        let key = format!("counter_{}", std::process::id());
        let ttl = Duration::from_secs(2);

        assert_eq!(store.incr_with_ttl(&key, ttl).await.unwrap(), 1);
        assert_eq!(store.incr_with_ttl(&key, ttl).await.unwrap(), 2);
        assert_eq!(store.get(&key).await.unwrap(), Some(2));

        store.set(&key, 9).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(9));

        // Expiry was applied at creation; the key goes away on its own.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_unavailable() {
        let config = RedisStoreConfig {
            url: "redis://127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(200),
            op_timeout: Duration::from_millis(200),
            key_prefix: "test_gatekeep".to_string(),
        };

        let err = match RedisCounterStore::new(config).await {
            Err(e) => e,
            Ok(_) => panic!("connect to a closed port should fail"),
        };
        assert!(matches!(
            err,
            StoreError::Unavailable(_) | StoreError::Timeout
        ));
    }
}
