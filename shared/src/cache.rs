//! Redis cache service shared across the workspace

use crate::{config::RedisConfig, error::AppError, Result};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, Script};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone)]
pub struct RedisService {
    connection: MultiplexedConnection,
}

impl RedisService {
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        info!("Initializing Redis connection");

        let client = Client::open(config.url.as_str())
            .map_err(|e| AppError::configuration(format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| AppError::configuration(format!("Failed to connect to Redis: {}", e)))?;

        let mut conn = connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await
            .map_err(|e| AppError::configuration(format!("Redis health check failed: {}", e)))?;

        info!("Redis connection initialized successfully");

        Ok(Self { connection })
    }

    /// Set a value with expiration
    pub async fn set_ex<T>(&self, key: &str, value: &T, expiration_seconds: u64) -> Result<()>
    where
        T: Serialize,
    {
        let serialized = serde_json::to_string(value)
            .map_err(|e| AppError::internal(format!("Failed to serialize value: {}", e)))?;

        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, serialized, expiration_seconds).await?;

        Ok(())
    }

    /// Set a value without expiration
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let serialized = serde_json::to_string(value)
            .map_err(|e| AppError::internal(format!("Failed to serialize value: {}", e)))?;

        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, serialized).await?;

        Ok(())
    }

    /// Get a value
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut conn = self.connection.clone();
        let result: Option<String> = conn.get(key).await?;

        match result {
            Some(serialized) => {
                let value = serde_json::from_str(&serialized)
                    .map_err(|e| AppError::internal(format!("Failed to deserialize value: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Delete a key
    pub async fn del(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let result: i32 = conn.del(key).await?;
        Ok(result > 0)
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let result: bool = conn.exists(key).await?;
        Ok(result)
    }

    /// Set expiration for a key
    pub async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        let mut conn = self.connection.clone();
        let result: bool = conn.expire(key, seconds as i64).await?;
        Ok(result)
    }

    /// Increment a counter with expiration set only on first increment
    pub async fn incr_window(&self, key: &str, window_seconds: u64) -> Result<i64> {
        let mut conn = self.connection.clone();
        let count: i64 = conn.incr(key, 1).await?;
        if count == 1 {
            conn.expire::<_, ()>(key, window_seconds as i64).await?;
        }
        Ok(count)
    }

    /// Atomically compare the value at `key` against `expected_version` and, if it matches,
    /// overwrite it with `new_value` and refresh its TTL. Returns `true` on success, `false`
    /// on a version mismatch (someone else already mutated the session). The Lua script runs
    /// on the Redis server so the check-then-set is indivisible even over a multiplexed
    /// connection shared by many concurrent requests.
    pub async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: u64,
        new_value: &str,
        ttl_seconds: u64,
    ) -> Result<bool> {
        const SCRIPT: &str = r#"
            local current = redis.call('GET', KEYS[1])
            if current == false then
                if tonumber(ARGV[1]) ~= 0 then
                    return 0
                end
            else
                local ok, decoded = pcall(cjson.decode, current)
                if not ok or decoded.version ~= tonumber(ARGV[1]) then
                    return 0
                end
            end
            redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
            return 1
        "#;

        let mut conn = self.connection.clone();
        let result: i32 = Script::new(SCRIPT)
            .key(key)
            .arg(expected_version)
            .arg(new_value)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await?;

        Ok(result == 1)
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Get connection for custom operations
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}
