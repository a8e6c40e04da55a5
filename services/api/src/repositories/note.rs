//! Note repository for database operations
//!
//! Default queries exclude soft-deleted rows; deletion only flips the flag.

use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{CreateNoteRequest, Note, UpdateNoteRequest};

const NOTE_COLUMNS: &str = "id, title, content, details, user_id, deleted, created_at, updated_at";

fn note_from_row(row: &sqlx::postgres::PgRow) -> Note {
    Note {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        details: row.get("details"),
        user_id: row.get("user_id"),
        deleted: row.get("deleted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Note repository for database operations
#[derive(Clone)]
pub struct NoteRepository {
    pool: PgPool,
}

impl NoteRepository {
    /// Create a new note repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a note owned by the given user
    pub async fn create(&self, user_id: Uuid, payload: &CreateNoteRequest) -> Result<Note> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO notes (title, content, details, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {NOTE_COLUMNS}
            "#,
        ))
        .bind(&payload.title)
        .bind(&payload.content)
        .bind(&payload.details)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(note_from_row(&row))
    }

    /// List a user's non-deleted notes, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Note>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {NOTE_COLUMNS}
            FROM notes
            WHERE user_id = $1 AND NOT deleted
            ORDER BY created_at DESC
            "#,
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    /// Find a non-deleted note by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Note>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {NOTE_COLUMNS}
            FROM notes
            WHERE id = $1 AND NOT deleted
            "#,
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(note_from_row))
    }

    /// Update a note's fields; absent fields keep their current value
    pub async fn update(&self, id: Uuid, payload: &UpdateNoteRequest) -> Result<Option<Note>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE notes
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                details = COALESCE($4, details),
                updated_at = now()
            WHERE id = $1 AND NOT deleted
            RETURNING {NOTE_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(&payload.title)
        .bind(&payload.content)
        .bind(&payload.details)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(note_from_row))
    }

    /// Soft-delete a note; returns whether a live row matched
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notes
            SET deleted = TRUE, updated_at = now()
            WHERE id = $1 AND NOT deleted
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Attach a tag to a note; attaching twice is a no-op
    pub async fn attach_tag(&self, note_id: Uuid, tag_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO note_tags (note_id, tag_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(note_id)
        .bind(tag_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Detach a tag from a note
    pub async fn detach_tag(&self, note_id: Uuid, tag_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM note_tags
            WHERE note_id = $1 AND tag_id = $2
            "#,
        )
        .bind(note_id)
        .bind(tag_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
