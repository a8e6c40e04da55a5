//! Cache-backed deny-list of revoked tokens
//!
//! Entries self-expire via Redis TTLs and have no durable counterpart.
//! Both operations are fail-open: an unreachable cache must never block
//! logout or silently block legitimate access, so failures degrade to
//! "not blacklisted" and are only logged.

use common::cache::RedisPool;
use tracing::warn;

/// Key prefix for blacklist entries
const BLACKLIST_PREFIX: &str = "blacklist:";

/// Default entry TTL: 24 hours, comfortably past any access token's life
pub const DEFAULT_BLACKLIST_TTL_SECS: u64 = 86_400;

/// Token deny-list backed by the cache
#[derive(Clone)]
pub struct Blacklist {
    redis: RedisPool,
}

impl Blacklist {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    fn key(token: &str) -> String {
        format!("{BLACKLIST_PREFIX}{token}")
    }

    /// Add a token to the deny-list.
    ///
    /// Returns `false` when the cache is unavailable instead of raising;
    /// callers treat that as a soft failure.
    pub async fn add(&self, token: &str, ttl_seconds: Option<u64>) -> bool {
        let ttl = ttl_seconds.unwrap_or(DEFAULT_BLACKLIST_TTL_SECS);
        match self.redis.set(&Self::key(token), "1", Some(ttl)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to blacklist token: {}", e);
                false
            }
        }
    }

    /// Whether a token has been revoked.
    ///
    /// An unavailable cache reads as "not blacklisted"; access tokens
    /// self-expire within the hour regardless.
    pub async fn is_blacklisted(&self, token: &str) -> bool {
        match self.redis.get(&Self::key(token)).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                warn!("Blacklist check failed, treating as not blacklisted: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::cache::RedisConfig;

    fn unreachable_pool() -> RedisPool {
        RedisPool::connect(&RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            connect_retries: 2,
        })
        .expect("client construction is offline")
    }

    #[tokio::test]
    async fn test_add_is_fail_open_when_cache_is_down() {
        let blacklist = Blacklist::new(unreachable_pool());
        assert!(!blacklist.add("tok1", Some(60)).await);
    }

    #[tokio::test]
    async fn test_is_blacklisted_is_fail_open_when_cache_is_down() {
        let blacklist = Blacklist::new(unreachable_pool());
        assert!(!blacklist.is_blacklisted("tok1").await);
        // Idempotent: a second check with no intervening add agrees.
        assert!(!blacklist.is_blacklisted("tok1").await);
    }

    #[tokio::test]
    #[ignore = "requires a local Redis instance"]
    async fn test_blacklist_entry_expires_with_ttl() {
        let pool = RedisPool::connect(&RedisConfig::from_env().expect("config loads"))
            .expect("client construction is offline");
        let blacklist = Blacklist::new(pool);

        assert!(blacklist.add("tok-ttl", Some(1)).await);
        assert!(blacklist.is_blacklisted("tok-ttl").await);

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!blacklist.is_blacklisted("tok-ttl").await);
    }
}
