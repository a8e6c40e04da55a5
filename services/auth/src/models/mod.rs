//! Authentication service models

pub mod role;
pub mod token;
pub mod user;

// Re-export for convenience
pub use role::{Permission, PermissionRef, Role};
pub use token::{NewTokenRecord, TokenKind, TokenRecord};
pub use user::{NewUser, User};
