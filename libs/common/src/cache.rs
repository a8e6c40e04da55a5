//! Redis cache module for the notable application
//!
//! This module provides a process-wide cache handle with an explicit
//! connect/close lifecycle. The underlying multiplexed connection is
//! established lazily and re-established with capped linear backoff when a
//! command fails, so transient cache outages never poison the handle.

use anyhow::Result;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Maximum reconnect attempts before a command fails
    pub connect_retries: u32,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    /// - `REDIS_CONNECT_RETRIES`: Maximum reconnect attempts (default: 5)
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let connect_retries = std::env::var("REDIS_CONNECT_RETRIES")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        Ok(RedisConfig {
            url,
            connect_retries,
        })
    }
}

/// Redis cache handle with a lazily-initialized shared connection
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
    conn: Arc<Mutex<Option<MultiplexedConnection>>>,
    connect_retries: u32,
}

impl RedisPool {
    /// Initialize a new Redis handle; no connection is opened until first use
    pub fn connect(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool {
            client,
            conn: Arc::new(Mutex::new(None)),
            connect_retries: config.connect_retries.max(1),
        })
    }

    /// Get the shared connection, establishing it if necessary.
    ///
    /// Reconnects wait `min(attempt * 50ms, 500ms)` between tries.
    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let mut attempt: u32 = 0;
        loop {
            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    *guard = Some(conn.clone());
                    return Ok(conn);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.connect_retries {
                        return Err(e.into());
                    }
                    let backoff = Duration::from_millis((u64::from(attempt) * 50).min(500));
                    warn!(
                        "Redis connect attempt {} failed ({}), retrying in {:?}",
                        attempt, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Drop the cached connection so the next command reconnects
    async fn invalidate(&self) {
        *self.conn.lock().await = None;
    }

    /// Set a key-value pair in Redis with optional TTL
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.connection().await?;

        let result = if let Some(ttl) = ttl_seconds {
            conn.set_ex::<_, _, ()>(key, value, ttl).await
        } else {
            conn.set::<_, _, ()>(key, value).await
        };

        if let Err(e) = result {
            self.invalidate().await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Get a value from Redis by key
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.invalidate().await;
                Err(e.into())
            }
        }
    }

    /// Delete a key from Redis
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        match conn.del::<_, u64>(key).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.invalidate().await;
                Err(e.into())
            }
        }
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection().await?;
        let pong: String = match redis::cmd("PING").query_async(&mut conn).await {
            Ok(pong) => pong,
            Err(e) => {
                self.invalidate().await;
                return Err(e.into());
            }
        };
        Ok(pong == "PONG")
    }

    /// Close the shared connection; subsequent commands reconnect lazily
    pub async fn close(&self) {
        self.invalidate().await;
    }
}
