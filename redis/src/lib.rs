//! Redis key-value store for the networks coordinator.
//!
//! Implements [`KeyValueStore`] over a Redis [`ConnectionManager`], which
//! multiplexes commands and reconnects on its own.
//!
//! Compare-and-set runs as a Lua script so the read and the write happen
//! atomically on the server:
//!
//! ```text
//! GET key ──► matches expected? ──yes──► SET key value ──► 1
//!                    │
//!                    └──no──► 0
//! ```
//!
//! # Example
//!
//! ```no_run
//! use netsaga_core::kv::KeyValueStore;
//! use netsaga_redis::RedisKeyValueStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisKeyValueStore::connect("redis://127.0.0.1:6379").await?;
//! store.set("GPBNetworks_svc-1", br#"{"service":"svc-1"}"#.to_vec()).await?;
//! # Ok(())
//! # }
//! ```

use netsaga_core::kv::{CasOutcome, KeyValueStore, StoreError, StoreFuture};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

/// `ARGV[1]` is `1` when a value is expected and `0` when the key must be
/// absent; `ARGV[2]` is the expected value and `ARGV[3]` the new one.
const COMPARE_AND_SET: &str = r"
    local current = redis.call('GET', KEYS[1])
    if ARGV[1] == '1' then
        if current ~= ARGV[2] then
            return 0
        end
    elseif current then
        return 0
    end
    redis.call('SET', KEYS[1], ARGV[3])
    return 1
";

/// Redis-backed [`KeyValueStore`].
#[derive(Clone)]
pub struct RedisKeyValueStore {
    conn_manager: ConnectionManager,
    cas_script: Script,
}

impl RedisKeyValueStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectionFailed`] if the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::ConnectionFailed(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("Failed to create Redis connection manager: {e}")))?;

        tracing::info!("Connected to Redis");
        Ok(Self {
            conn_manager,
            cas_script: Script::new(COMPARE_AND_SET),
        })
    }
}

fn failed(operation: &'static str, key: &str, error: &redis::RedisError) -> StoreError {
    StoreError::OperationFailed {
        operation,
        key: key.to_string(),
        reason: error.to_string(),
    }
}

impl KeyValueStore for RedisKeyValueStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.get::<_, Option<Vec<u8>>>(key)
                .await
                .map_err(|e| failed("get", key, &e))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.set::<_, _, ()>(key, value)
                .await
                .map_err(|e| failed("set", key, &e))?;
            tracing::trace!(key, "Value written");
            Ok(())
        })
    }

    fn compare_and_set<'a>(
        &'a self,
        key: &'a str,
        expected: Option<Vec<u8>>,
        value: Vec<u8>,
    ) -> StoreFuture<'a, CasOutcome> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let (flag, expected) = match expected {
                Some(bytes) => ("1", bytes),
                None => ("0", Vec::new()),
            };

            let written: i64 = self
                .cas_script
                .key(key)
                .arg(flag)
                .arg(expected)
                .arg(value)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| failed("compare_and_set", key, &e))?;

            if written == 1 {
                Ok(CasOutcome::Written)
            } else {
                tracing::debug!(key, "Compare-and-set lost the race");
                Ok(CasOutcome::Conflict)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_store_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedisKeyValueStore>();
        assert_sync::<RedisKeyValueStore>();
    }

    #[tokio::test]
    async fn invalid_url_is_a_connection_error() {
        let result = RedisKeyValueStore::connect("not-a-redis-url").await;
        assert!(matches!(result, Err(StoreError::ConnectionFailed(_))));
    }
}
