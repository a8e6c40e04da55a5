//! HTTP error type for the authentication service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DomainError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Application error for the auth service handlers
#[derive(Error, Debug)]
pub enum AuthError {
    /// Domain error carrying its own status mapping
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Internal error with a caller-visible message
    #[error("{0}")]
    Internal(String),

    /// Anything the repositories bubble up; logged and masked as 500
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Type alias for handler results
pub type AuthResult<T> = Result<T, AuthError>;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::Domain(domain) => match domain {
                DomainError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg),
                DomainError::Authorization(msg) => (StatusCode::FORBIDDEN, msg),
                DomainError::NotFound(entity) => {
                    (StatusCode::NOT_FOUND, format!("{entity} not found"))
                }
                DomainError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
                DomainError::DependencyDegraded(msg) => {
                    // Never a caller-visible failure mode; reaching here
                    // means a bug upstream, so log loudly and degrade.
                    error!("Dependency degradation surfaced to handler: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
            },
            AuthError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AuthError::Unexpected(e) => {
                error!("Unexpected error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
