//! Token store with dual-write consistency
//!
//! The database is the system of record for every issued token; the cache
//! mirrors the active refresh token per user for low-latency revalidation.
//! Writes go durable-first, then cache, and the cache side is best-effort
//! throughout: a failed mirror write or read degrades to "not found" and
//! is logged, never fatal.

use anyhow::Result;
use chrono::Utc;
use common::cache::RedisPool;
use tracing::warn;
use uuid::Uuid;

use crate::models::{NewTokenRecord, TokenKind, TokenRecord};
use crate::repositories::TokenRepository;

/// Outcome of comparing the durable and cached views of a user's refresh
/// token.
///
/// `matches` is `Some` only when both sides returned a value; otherwise the
/// comparison is indeterminate and neither confirms nor denies consistency.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub db_token: Option<String>,
    pub cache_token: Option<String>,
    pub matches: Option<bool>,
}

impl Reconciliation {
    fn compare(db_token: Option<String>, cache_token: Option<String>) -> Self {
        let matches = match (&db_token, &cache_token) {
            (Some(db), Some(cache)) => Some(db == cache),
            _ => None,
        };
        Self {
            db_token,
            cache_token,
            matches,
        }
    }
}

/// Token store combining the durable repository and the cache mirror
#[derive(Clone)]
pub struct TokenStore {
    tokens: TokenRepository,
    redis: RedisPool,
}

fn session_key(user_id: Uuid) -> String {
    format!("session:{user_id}")
}

impl TokenStore {
    pub fn new(tokens: TokenRepository, redis: RedisPool) -> Self {
        Self { tokens, redis }
    }

    /// Durably persist an access token record
    pub async fn persist_access(&self, record: &NewTokenRecord) -> Result<TokenRecord> {
        self.tokens.insert(record).await
    }

    /// Durably persist a refresh token record
    pub async fn persist_refresh(&self, record: &NewTokenRecord) -> Result<TokenRecord> {
        self.tokens.insert(record).await
    }

    /// Mirror the active refresh token for a user into the cache.
    ///
    /// Best-effort: the database record stays authoritative, so a cache
    /// failure is logged and swallowed.
    pub async fn mirror_refresh(&self, user_id: Uuid, token: &str, ttl_seconds: u64) {
        if let Err(e) = self
            .redis
            .set(&session_key(user_id), token, Some(ttl_seconds))
            .await
        {
            warn!("Failed to mirror refresh token for user {}: {}", user_id, e);
        }
    }

    /// Read the cached refresh token for a user; cache errors read as absent
    pub async fn cached_refresh(&self, user_id: Uuid) -> Option<String> {
        match self.redis.get(&session_key(user_id)).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache lookup failed for user {}: {}", user_id, e);
                None
            }
        }
    }

    /// Drop the cached refresh token for a user; errors are logged only
    pub async fn drop_mirror(&self, user_id: Uuid) {
        if let Err(e) = self.redis.delete(&session_key(user_id)).await {
            warn!("Failed to drop session mirror for user {}: {}", user_id, e);
        }
    }

    /// Compare the durable and cached views of a refresh token.
    ///
    /// Each side is fetched independently; a lookup failure on either side
    /// degrades that side to "not found" instead of aborting the whole
    /// reconciliation.
    pub async fn reconcile(&self, user_id: Uuid, token: &str) -> Reconciliation {
        let db_token = match self.tokens.find_by_token(token, TokenKind::Refresh).await {
            Ok(record) => record.map(|r| r.token),
            Err(e) => {
                warn!("Database lookup failed during reconcile: {}", e);
                None
            }
        };

        let cache_token = self.cached_refresh(user_id).await;

        Reconciliation::compare(db_token, cache_token)
    }

    /// Find the durable refresh record for a presented token
    pub async fn find_refresh(&self, token: &str) -> Result<Option<TokenRecord>> {
        self.tokens.find_by_token(token, TokenKind::Refresh).await
    }

    /// Mark a token's durable record revoked; returns whether a row matched
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        self.tokens.mark_revoked(token).await
    }

    /// Delete the durable refresh record for a token
    pub async fn delete_refresh(&self, token: &str) -> Result<bool> {
        self.tokens.delete_by_token(token, TokenKind::Refresh).await
    }

    /// Sweep records expired longer than the grace window ago
    pub async fn purge_expired(&self, grace_days: i64) -> Result<u64> {
        self.tokens.purge_expired(grace_days).await
    }

    /// Whether a durable record's expiry has passed
    pub fn is_expired(record: &TokenRecord) -> bool {
        record.expires_at < Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciliation_matches_only_when_both_sides_present() {
        let both_equal =
            Reconciliation::compare(Some("tok".to_string()), Some("tok".to_string()));
        assert_eq!(both_equal.matches, Some(true));

        let both_differ =
            Reconciliation::compare(Some("tok-a".to_string()), Some("tok-b".to_string()));
        assert_eq!(both_differ.matches, Some(false));

        let cache_missing = Reconciliation::compare(Some("tok".to_string()), None);
        assert_eq!(cache_missing.matches, None);

        let db_missing = Reconciliation::compare(None, Some("tok".to_string()));
        assert_eq!(db_missing.matches, None);

        let neither = Reconciliation::compare(None, None);
        assert_eq!(neither.matches, None);
    }

    #[test]
    fn test_session_key_is_per_user() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_ne!(session_key(a), session_key(b));
        assert!(session_key(a).starts_with("session:"));
    }
}
