//! Shared error types for the notable services
//!
//! This module defines the domain error taxonomy used across the auth and
//! api services, plus the database error type used by the connection layer.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Domain error taxonomy shared by every service.
///
/// Each variant maps to a fixed HTTP status at the service boundary:
/// authentication failures are 401, authorization failures 403, missing
/// entities 404, malformed input 400. `DependencyDegraded` is never surfaced
/// to callers; it is logged and treated as a soft "unknown" state.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Missing, invalid, or expired credentials (401)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Valid identity but insufficient permission (403)
    #[error("Forbidden: {0}")]
    Authorization(String),

    /// A referenced entity does not exist (404)
    #[error("{0} not found")]
    NotFound(String),

    /// Malformed or rejected input (400)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Cache or secondary store unavailable; logged, never fatal
    #[error("Dependency degraded: {0}")]
    DependencyDegraded(String),
}

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
