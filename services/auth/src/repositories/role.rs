//! Role repository for database operations
//!
//! Roles are always loaded with their permission set populated, since
//! every consumer (token issuance, the permission resolver's database
//! fallback) needs the names.

use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Permission, PermissionRef, Role};

/// Role repository
#[derive(Clone)]
pub struct RoleRepository {
    pool: PgPool,
}

impl RoleRepository {
    /// Create a new role repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a non-deleted role by name, permissions populated
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Role>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, deleted, created_at, updated_at
            FROM roles
            WHERE name = $1 AND NOT deleted
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.populate(row).await?)),
            None => Ok(None),
        }
    }

    /// Find a non-deleted role by ID, permissions populated
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, deleted, created_at, updated_at
            FROM roles
            WHERE id = $1 AND NOT deleted
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.populate(row).await?)),
            None => Ok(None),
        }
    }

    /// Attach the role's non-deleted permissions
    async fn populate(&self, row: sqlx::postgres::PgRow) -> Result<Role> {
        let role_id: Uuid = row.get("id");

        let permission_rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.description, p.deleted
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1 AND NOT p.deleted
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;

        let permissions = permission_rows
            .iter()
            .map(|p| {
                PermissionRef::Resolved(Permission {
                    id: p.get("id"),
                    name: p.get("name"),
                    description: p.get("description"),
                    deleted: p.get("deleted"),
                })
            })
            .collect();

        Ok(Role {
            id: role_id,
            name: row.get("name"),
            permissions,
            deleted: row.get("deleted"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
