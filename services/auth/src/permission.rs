//! Permission resolver
//!
//! Layered defense with a fixed check order: cheap claim-based checks
//! first, a database round-trip only as a last resort. The fallback exists
//! so a request is never denied solely because the token's permission
//! snapshot went stale after the backing role changed.

use anyhow::Result;
use uuid::Uuid;

use crate::middleware::AuthContext;
use crate::models::Role;
use crate::repositories::RoleRepository;

/// Authorization outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// Why an authorization check denied
#[derive(Debug, Clone, PartialEq)]
pub enum DenyReason {
    /// No authenticated identity on the request
    Unauthenticated,
    /// The identity's role could not be resolved
    RoleNotFound,
    /// The role exists but does not grant the required permission
    MissingPermission,
}

/// Role lookup used by the database fallback.
///
/// Implemented by [`RoleRepository`] in production and by an in-memory
/// directory in tests.
pub trait RoleDirectory {
    async fn role_by_name(&self, name: &str) -> Result<Option<Role>>;
    async fn role_by_id(&self, id: Uuid) -> Result<Option<Role>>;
}

impl RoleDirectory for RoleRepository {
    async fn role_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.find_by_name(name).await
    }

    async fn role_by_id(&self, id: Uuid) -> Result<Option<Role>> {
        self.find_by_id(id).await
    }
}

/// Decide whether the identity may perform the action guarded by
/// `required_permission`.
///
/// Checks run in a fixed order, short-circuiting on first match:
/// 1. no identity: deny
/// 2. admin flag: allow
/// 3. permission present verbatim in the token snapshot: allow
/// 4. role name "admin": allow
/// 5. database fallback through the role's resolved permission set
pub async fn authorize(
    context: Option<&AuthContext>,
    required_permission: &str,
    roles: &impl RoleDirectory,
) -> Result<Decision> {
    let Some(context) = context else {
        return Ok(Decision::Deny(DenyReason::Unauthenticated));
    };

    if context.admin {
        return Ok(Decision::Allow);
    }

    if context
        .permissions
        .iter()
        .any(|p| p == required_permission)
    {
        return Ok(Decision::Allow);
    }

    if context.role == "admin" {
        return Ok(Decision::Allow);
    }

    // Database fallback: by name first, then by id when the role string is
    // structurally a UUID.
    let mut role = roles.role_by_name(&context.role).await?;
    if role.is_none() {
        if let Ok(role_id) = Uuid::parse_str(&context.role) {
            role = roles.role_by_id(role_id).await?;
        }
    }

    let Some(role) = role else {
        return Ok(Decision::Deny(DenyReason::RoleNotFound));
    };

    if role.grants(required_permission) {
        Ok(Decision::Allow)
    } else {
        Ok(Decision::Deny(DenyReason::MissingPermission))
    }
}
