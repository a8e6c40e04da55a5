//! Role and permission models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Permission entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub deleted: bool,
}

/// A permission reference as it appears in roles and token claims.
///
/// Stored roles carry fully populated permissions, but token claims minted
/// by older deployments may carry bare id strings. Every consumer goes
/// through [`PermissionRef::name`] instead of matching on the shape itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionRef {
    /// Fully populated permission document
    Resolved(Permission),
    /// Bare permission id, passed through as-is
    Id(String),
}

impl PermissionRef {
    /// The comparable name of this reference.
    ///
    /// Resolved entries yield the permission name; bare ids yield the raw
    /// id string unchanged.
    pub fn name(&self) -> &str {
        match self {
            PermissionRef::Resolved(permission) => &permission.name,
            PermissionRef::Id(id) => id,
        }
    }
}

/// Role entity with its permission set populated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub permissions: Vec<PermissionRef>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Whether the role grants the named permission, regardless of how
    /// each entry is represented.
    pub fn grants(&self, permission_name: &str) -> bool {
        self.permissions.iter().any(|p| p.name() == permission_name)
    }
}
