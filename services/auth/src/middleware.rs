//! Auth gate: per-request JWT validation middleware
//!
//! Requires a `Authorization: Bearer <token>` header, verifies the token
//! against the current and retired access secrets, rejects blacklisted
//! tokens (fail-open on cache trouble), and normalizes the raw claims into
//! the canonical [`AuthContext`] that all downstream authorization consumes.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::error;
use uuid::Uuid;

use crate::jwt::AccessClaims;
use crate::state::AppState;

/// Canonical identity context derived from a verified access token.
///
/// Downstream code never touches the raw token or claims; this is the only
/// shape authorization works with.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub id: Uuid,
    /// Role name; defaults to "user" when the token carries none
    pub role: String,
    /// Role id, when the token carries one
    pub role_id: Option<Uuid>,
    /// Permission-name snapshot from the token; defaults to empty
    pub permissions: Vec<String>,
    /// True when the claim says so explicitly, or the role name is "admin"
    pub admin: bool,
}

/// Normalize verified claims into an [`AuthContext`].
///
/// Rejects claims that lack an identity subject under either accepted
/// field name.
pub fn normalize_claims(claims: &AccessClaims) -> Result<AuthContext, StatusCode> {
    let id = claims.sub.ok_or(StatusCode::UNAUTHORIZED)?;
    let role = claims.role.clone().unwrap_or_else(|| "user".to_string());
    let admin = claims.admin || role == "admin";

    Ok(AuthContext {
        id,
        role,
        role_id: claims.role_id,
        permissions: claims.permissions.clone(),
        admin,
    })
}

/// Extract and validate the JWT access token from the Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    // A missing header is rejected, never defaulted.
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Signature and expiry are fail-closed: any doubt denies.
    let claims = state.jwt_service.verify_access(token).map_err(|e| {
        error!("Failed to validate token: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    // Blacklist is fail-open; a cache outage must not block valid tokens.
    if state.blacklist.is_blacklisted(token).await {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let context = normalize_claims(&claims)?;
    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_claims() -> AccessClaims {
        AccessClaims {
            sub: Some(Uuid::new_v4()),
            username: Some("ada".to_string()),
            name: None,
            email: None,
            role: None,
            role_id: None,
            permissions: vec![],
            admin: false,
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[test]
    fn test_missing_subject_is_rejected() {
        let mut claims = base_claims();
        claims.sub = None;
        assert_eq!(normalize_claims(&claims), Err(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_role_defaults_to_user() {
        let context = normalize_claims(&base_claims()).expect("normalization succeeds");
        assert_eq!(context.role, "user");
        assert!(context.permissions.is_empty());
        assert!(!context.admin);
    }

    #[test]
    fn test_admin_role_name_implies_admin_flag() {
        let mut claims = base_claims();
        claims.role = Some("admin".to_string());
        let context = normalize_claims(&claims).expect("normalization succeeds");
        assert!(context.admin);
    }

    #[test]
    fn test_explicit_admin_flag_survives_other_roles() {
        let mut claims = base_claims();
        claims.role = Some("editor".to_string());
        claims.admin = true;
        let context = normalize_claims(&claims).expect("normalization succeeds");
        assert!(context.admin);
        assert_eq!(context.role, "editor");
    }
}
