//! Authentication middleware for JWT token validation
//!
//! The api service validates access tokens on its own, with the same
//! secret-rotation rule the auth service applies: the current secret
//! first, then each retired secret in order, surfacing the primary
//! verification error if every candidate fails.

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::error;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Access token claims, as minted by the auth service
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// User ID; older issuers wrote it as `userId`
    #[serde(default, alias = "userId")]
    pub sub: Option<Uuid>,
    /// Role name
    #[serde(default)]
    pub role: Option<String>,
    /// Permission-name snapshot
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub admin: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated user information
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
    pub permissions: Vec<String>,
    pub admin: bool,
}

impl AuthUser {
    /// Whether this user may touch a row owned by `owner_id`
    pub fn owns_or_admin(&self, owner_id: Uuid) -> bool {
        self.admin || self.id == owner_id
    }
}

/// JWT verification configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret verifying access tokens
    pub access_secret: String,
    /// Retired secrets still accepted, newest first
    pub legacy_secrets: Vec<String>,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    pub fn from_env() -> Result<Self, String> {
        let access_secret = env::var("JWT_ACCESS_SECRET")
            .map_err(|_| "JWT_ACCESS_SECRET environment variable not set".to_string())?;

        let legacy_secrets = env::var("JWT_LEGACY_SECRETS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(JwtConfig {
            access_secret,
            legacy_secrets,
        })
    }

    /// Verify a token against the current and retired secrets
    pub fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        let validation = Validation::default();
        let mut primary_error = None;

        let mut candidates = vec![self.access_secret.as_str()];
        for legacy in &self.legacy_secrets {
            if legacy != &self.access_secret {
                candidates.push(legacy.as_str());
            }
        }

        for secret in candidates {
            match decode::<Claims>(
                token,
                &DecodingKey::from_secret(secret.as_bytes()),
                &validation,
            ) {
                Ok(data) => return Ok(data.claims),
                Err(e) => {
                    if primary_error.is_none() {
                        primary_error = Some(e);
                    }
                }
            }
        }

        Err(primary_error.expect("candidate secret list is never empty"))
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    // Extract the Authorization header
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    // Check if it's a Bearer token
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    // Validate the token
    let claims = state.jwt_config.verify(token).map_err(|e| {
        error!("Failed to validate token: {}", e);
        ApiError::Unauthorized
    })?;

    let id = claims.sub.ok_or(ApiError::Unauthorized)?;
    let role = claims.role.unwrap_or_else(|| "user".to_string());
    let admin = claims.admin || role == "admin";

    let user = AuthUser {
        id,
        role,
        permissions: claims.permissions,
        admin,
    };

    // Insert the user into the request extensions
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
