//! Application state shared across handlers

use sqlx::PgPool;

use crate::{
    blacklist::Blacklist,
    jwt::JwtService,
    repositories::{RoleRepository, UserRepository},
    token_store::TokenStore,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub role_repository: RoleRepository,
    pub token_store: TokenStore,
    pub blacklist: Blacklist,
}
