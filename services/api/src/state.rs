//! Application state shared across handlers

use sqlx::PgPool;

use crate::{
    middleware::JwtConfig,
    repositories::{NoteRepository, TagRepository},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_config: JwtConfig,
    pub note_repository: NoteRepository,
    pub tag_repository: TagRepository,
}
