//! API service routes: notes and tags CRUD
//!
//! Every route is bearer-gated. Ownership is enforced on reads and writes
//! alike; admins bypass it. Deletes are soft everywhere.

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    middleware::{AuthUser, auth_middleware},
    models::{CreateNoteRequest, CreateTagRequest, UpdateNoteRequest},
    state::AppState,
};

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/notes", post(create_note).get(list_notes))
        .route("/notes/:id", get(get_note).put(update_note).delete(delete_note))
        .route("/notes/:id/tags/:tag_id", post(attach_tag).delete(detach_tag))
        .route("/tags", post(create_tag).get(list_tags))
        .route("/tags/:id", delete(delete_tag))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "api-service"
    }))
}

/// Create a note owned by the caller
pub async fn create_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateNoteRequest>,
) -> ApiResult<impl IntoResponse> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title is required".to_string()));
    }

    let note = state
        .note_repository
        .create(user.id, &payload)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create note: {}", e);
            ApiError::InternalServerError
        })?;

    Ok((StatusCode::CREATED, Json(note)))
}

/// List the caller's notes
pub async fn list_notes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let notes = state
        .note_repository
        .list_for_user(user.id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list notes: {}", e);
            ApiError::InternalServerError
        })?;

    Ok(Json(notes))
}

/// Get a note by ID
pub async fn get_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let note = state
        .note_repository
        .find_by_id(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch note: {}", e);
            ApiError::InternalServerError
        })?
        .ok_or_else(|| ApiError::NotFound("Note".to_string()))?;

    if !user.owns_or_admin(note.user_id) {
        return Err(ApiError::Forbidden);
    }

    Ok(Json(note))
}

/// Update a note
pub async fn update_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateNoteRequest>,
) -> ApiResult<impl IntoResponse> {
    let existing = state
        .note_repository
        .find_by_id(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch note: {}", e);
            ApiError::InternalServerError
        })?
        .ok_or_else(|| ApiError::NotFound("Note".to_string()))?;

    if !user.owns_or_admin(existing.user_id) {
        return Err(ApiError::Forbidden);
    }

    let note = state
        .note_repository
        .update(id, &payload)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update note: {}", e);
            ApiError::InternalServerError
        })?
        .ok_or_else(|| ApiError::NotFound("Note".to_string()))?;

    Ok(Json(note))
}

/// Soft-delete a note
pub async fn delete_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let existing = state
        .note_repository
        .find_by_id(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch note: {}", e);
            ApiError::InternalServerError
        })?
        .ok_or_else(|| ApiError::NotFound("Note".to_string()))?;

    if !user.owns_or_admin(existing.user_id) {
        return Err(ApiError::Forbidden);
    }

    state.note_repository.soft_delete(id).await.map_err(|e| {
        tracing::error!("Failed to delete note: {}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(json!({"message": "Note deleted"})))
}

/// Attach a tag to a note
pub async fn attach_tag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((id, tag_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let note = state
        .note_repository
        .find_by_id(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch note: {}", e);
            ApiError::InternalServerError
        })?
        .ok_or_else(|| ApiError::NotFound("Note".to_string()))?;

    let tag = state
        .tag_repository
        .find_by_id(tag_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch tag: {}", e);
            ApiError::InternalServerError
        })?
        .ok_or_else(|| ApiError::NotFound("Tag".to_string()))?;

    if !user.owns_or_admin(note.user_id) || !user.owns_or_admin(tag.user_id) {
        return Err(ApiError::Forbidden);
    }

    state
        .note_repository
        .attach_tag(id, tag_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to attach tag: {}", e);
            ApiError::InternalServerError
        })?;

    Ok(Json(json!({"message": "Tag attached"})))
}

/// Detach a tag from a note
pub async fn detach_tag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((id, tag_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let note = state
        .note_repository
        .find_by_id(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch note: {}", e);
            ApiError::InternalServerError
        })?
        .ok_or_else(|| ApiError::NotFound("Note".to_string()))?;

    if !user.owns_or_admin(note.user_id) {
        return Err(ApiError::Forbidden);
    }

    let detached = state
        .note_repository
        .detach_tag(id, tag_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to detach tag: {}", e);
            ApiError::InternalServerError
        })?;

    if !detached {
        return Err(ApiError::NotFound("Tag".to_string()));
    }

    Ok(Json(json!({"message": "Tag detached"})))
}

/// Create a tag owned by the caller
pub async fn create_tag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateTagRequest>,
) -> ApiResult<impl IntoResponse> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }

    let tag = state
        .tag_repository
        .create(user.id, &payload)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create tag: {}", e);
            ApiError::InternalServerError
        })?;

    Ok((StatusCode::CREATED, Json(tag)))
}

/// List the caller's tags
pub async fn list_tags(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let tags = state
        .tag_repository
        .list_for_user(user.id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list tags: {}", e);
            ApiError::InternalServerError
        })?;

    Ok(Json(tags))
}

/// Soft-delete a tag
pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let tag = state
        .tag_repository
        .find_by_id(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch tag: {}", e);
            ApiError::InternalServerError
        })?
        .ok_or_else(|| ApiError::NotFound("Tag".to_string()))?;

    if !user.owns_or_admin(tag.user_id) {
        return Err(ApiError::Forbidden);
    }

    state.tag_repository.soft_delete(id).await.map_err(|e| {
        tracing::error!("Failed to delete tag: {}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(json!({"message": "Tag deleted"})))
}
