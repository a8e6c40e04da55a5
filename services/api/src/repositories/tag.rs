//! Tag repository for database operations

use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{CreateTagRequest, Tag};

const TAG_COLUMNS: &str = "id, name, user_id, deleted, created_at, updated_at";

fn tag_from_row(row: &sqlx::postgres::PgRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        user_id: row.get("user_id"),
        deleted: row.get("deleted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Tag repository for database operations
#[derive(Clone)]
pub struct TagRepository {
    pool: PgPool,
}

impl TagRepository {
    /// Create a new tag repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a tag owned by the given user
    pub async fn create(&self, user_id: Uuid, payload: &CreateTagRequest) -> Result<Tag> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tags (name, user_id)
            VALUES ($1, $2)
            RETURNING {TAG_COLUMNS}
            "#,
        ))
        .bind(&payload.name)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(tag_from_row(&row))
    }

    /// List a user's non-deleted tags
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Tag>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TAG_COLUMNS}
            FROM tags
            WHERE user_id = $1 AND NOT deleted
            ORDER BY name
            "#,
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(tag_from_row).collect())
    }

    /// Find a non-deleted tag by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Tag>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {TAG_COLUMNS}
            FROM tags
            WHERE id = $1 AND NOT deleted
            "#,
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(tag_from_row))
    }

    /// Soft-delete a tag; returns whether a live row matched
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tags
            SET deleted = TRUE, updated_at = now()
            WHERE id = $1 AND NOT deleted
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
