//! Token record repository
//!
//! Append-only durable writes for access and refresh records, lookup by
//! token value, revocation, and the grace-window purge of long-expired
//! rows.

use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};

use crate::models::{NewTokenRecord, TokenKind, TokenRecord};

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<TokenRecord> {
    let kind: String = row.get("kind");
    let kind = TokenKind::from_str(&kind)
        .ok_or_else(|| anyhow::anyhow!("Unknown token kind in database: {}", kind))?;

    Ok(TokenRecord {
        id: row.get("id"),
        token: row.get("token"),
        user_id: row.get("user_id"),
        kind,
        revoked: row.get("revoked"),
        expires_at: row.get("expires_at"),
        user_agent: row.get("user_agent"),
        ip: row.get("ip"),
        created_at: row.get("created_at"),
    })
}

/// Token record repository
#[derive(Clone)]
pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    /// Create a new token repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new token record
    pub async fn insert(&self, record: &NewTokenRecord) -> Result<TokenRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO tokens (token, user_id, kind, expires_at, user_agent, ip)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, token, user_id, kind, revoked, expires_at, user_agent, ip, created_at
            "#,
        )
        .bind(&record.token)
        .bind(record.user_id)
        .bind(record.kind.as_str())
        .bind(record.expires_at)
        .bind(&record.user_agent)
        .bind(&record.ip)
        .fetch_one(&self.pool)
        .await?;

        record_from_row(&row)
    }

    /// Find a record by its token value and kind
    pub async fn find_by_token(&self, token: &str, kind: TokenKind) -> Result<Option<TokenRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, token, user_id, kind, revoked, expires_at, user_agent, ip, created_at
            FROM tokens
            WHERE token = $1 AND kind = $2
            "#,
        )
        .bind(token)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Mark a record revoked by token value, regardless of kind.
    ///
    /// Returns whether any row was updated.
    pub async fn mark_revoked(&self, token: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tokens
            SET revoked = TRUE
            WHERE token = $1 AND NOT revoked
            "#,
        )
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a record by token value and kind; returns whether a row existed
    pub async fn delete_by_token(&self, token: &str, kind: TokenKind) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM tokens
            WHERE token = $1 AND kind = $2
            "#,
        )
        .bind(token)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete rows whose expiry is more than `grace_days` in the past.
    ///
    /// The grace window keeps expired records queryable for audit before
    /// they are swept. Returns the number of rows removed.
    pub async fn purge_expired(&self, grace_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(grace_days);

        let result = sqlx::query(
            r#"
            DELETE FROM tokens
            WHERE expires_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
