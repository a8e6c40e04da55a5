//! Authentication service routes

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use common::error::DomainError;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    error::{AuthError, AuthResult},
    jwt::IssuedRefreshToken,
    middleware::{AuthContext, auth_middleware},
    models::{NewTokenRecord, NewUser, Role, TokenKind, User},
    password::{self, HashProfile},
    permission::{Decision, authorize},
    state::AppState,
    validation,
};

/// Request for user signup
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub password: String,
}

/// Request for user login
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

/// Response carrying a fresh token pair
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: User,
    pub token: String,
    pub refresh_token: String,
}

/// Request for token refresh and logout bodies
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

/// Response for token refresh
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub token: String,
    pub refresh_token: String,
}

/// Query parameters for the permission check endpoint
#[derive(Deserialize)]
pub struct CheckPermissionQuery {
    pub role: Option<String>,
    pub permission: String,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/check-permission", get(check_permission))
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_token))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Client metadata captured on token issuance for audit
fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    (user_agent, ip)
}

/// Map a failed user insert.
///
/// A concurrent duplicate signup can lose the check-then-insert race and
/// hit the unique index instead; that must surface as the same validation
/// failure the explicit existence check produces, not as a 500.
fn map_creation_error(e: anyhow::Error) -> AuthError {
    match e.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            DomainError::Validation("User already exists".to_string()).into()
        }
        _ => AuthError::Unexpected(e),
    }
}

/// Issue, persist, and mirror a token pair for a user.
///
/// Durable writes come first; the cache mirror is best-effort and ordered
/// last so a crash leaves the database authoritative.
async fn issue_session(
    state: &AppState,
    user: &User,
    role: &Role,
    headers: &HeaderMap,
) -> AuthResult<(String, IssuedRefreshToken)> {
    let access_token = state
        .jwt_service
        .issue_access_token(user, role, None)
        .map_err(|e| {
            error!("Failed to generate access token: {}", e);
            AuthError::Internal("Internal server error".to_string())
        })?;

    let refresh = state.jwt_service.issue_refresh_token(user).map_err(|e| {
        error!("Failed to generate refresh token: {}", e);
        AuthError::Internal("Internal server error".to_string())
    })?;

    let (user_agent, ip) = client_meta(headers);

    state
        .token_store
        .persist_access(&NewTokenRecord {
            token: access_token.clone(),
            user_id: user.id,
            kind: TokenKind::Access,
            expires_at: Utc::now() + Duration::seconds(state.jwt_service.access_token_expiry()),
            user_agent,
            ip,
        })
        .await?;

    state
        .token_store
        .persist_refresh(&NewTokenRecord {
            token: refresh.token.clone(),
            user_id: user.id,
            kind: TokenKind::Refresh,
            expires_at: refresh.expires_at,
            user_agent: None,
            ip: None,
        })
        .await?;

    state
        .token_store
        .mirror_refresh(
            user.id,
            &refresh.token,
            state.jwt_service.refresh_token_expiry() as u64,
        )
        .await;

    Ok((access_token, refresh))
}

/// User signup endpoint
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SignupRequest>,
) -> AuthResult<impl IntoResponse> {
    info!("Signup attempt for username: {}", payload.username);

    validation::validate_username(&payload.username)
        .map_err(|msg| DomainError::Validation(msg))?;
    validation::validate_email(&payload.email).map_err(|msg| DomainError::Validation(msg))?;
    validation::validate_password(&payload.password)
        .map_err(|msg| DomainError::Validation(msg))?;

    if state
        .user_repository
        .find_by_username_or_email(&payload.username)
        .await?
        .is_some()
        || state
            .user_repository
            .find_by_username_or_email(&payload.email)
            .await?
            .is_some()
    {
        return Err(DomainError::Validation("User already exists".to_string()).into());
    }

    // Signup is impossible without the default role.
    let role = state
        .role_repository
        .find_by_name("user")
        .await?
        .ok_or_else(|| AuthError::Internal("Default role not found".to_string()))?;

    let password_hash = password::hash(&payload.password, HashProfile::Strong).map_err(|e| {
        error!("Failed to hash password: {}", e);
        AuthError::Internal("Internal server error".to_string())
    })?;

    let user = state
        .user_repository
        .create(&NewUser {
            username: payload.username,
            email: payload.email,
            name: payload.name,
            password_hash,
            role_id: role.id,
        })
        .await
        .map_err(map_creation_error)?;

    let (token, refresh) = issue_session(&state, &user, &role, &headers).await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            user,
            token,
            refresh_token: refresh.token,
        }),
    ))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    info!("Login attempt for: {}", payload.username_or_email);

    let user = state
        .user_repository
        .find_by_username_or_email(&payload.username_or_email)
        .await?
        .ok_or_else(|| DomainError::Validation("Invalid credentials".to_string()))?;

    let password_matches =
        password::verify(&user.password_hash, &payload.password).map_err(|e| {
            error!("Password verification failed: {}", e);
            AuthError::Internal("Internal server error".to_string())
        })?;

    if !password_matches {
        return Err(DomainError::Validation("Invalid credentials".to_string()).into());
    }

    let role = state
        .role_repository
        .find_by_id(user.role_id)
        .await?
        .ok_or_else(|| AuthError::Internal("Role not found".to_string()))?;

    let (token, refresh) = issue_session(&state, &user, &role, &headers).await?;

    Ok((
        StatusCode::OK,
        Json(SessionResponse {
            user,
            token,
            refresh_token: refresh.token,
        }),
    ))
}

/// Logout endpoint; always answers 200, even on internal failure.
///
/// Blacklisting and revocation are fail-open here: an unavailable cache or
/// database must never block a logout.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<RefreshTokenRequest>>,
) -> impl IntoResponse {
    info!("Logout request");

    // Deny-list the presented access token for the rest of its life.
    if let Some(access_token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        if !state.blacklist.add(access_token, None).await {
            warn!("Blacklist unavailable during logout; continuing");
        }
        if let Err(e) = state.token_store.revoke(access_token).await {
            warn!("Failed to revoke access record during logout: {}", e);
        }
    }

    // Revoke the refresh token and drop its cache mirror.
    if let Some(refresh_token) = payload.and_then(|Json(body)| body.refresh_token) {
        if let Err(e) = state.token_store.revoke(&refresh_token).await {
            warn!("Failed to revoke refresh record during logout: {}", e);
        }
        if let Ok(claims) = state.jwt_service.verify_refresh(&refresh_token) {
            if let Some(user_id) = claims.sub {
                state.token_store.drop_mirror(user_id).await;
            }
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"message": "Logged out successfully"})),
    )
}

/// Refresh token endpoint: exchanges a live refresh token for a new pair
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<impl IntoResponse> {
    info!("Token refresh request");

    let presented = payload
        .refresh_token
        .ok_or_else(|| DomainError::Validation("Refresh token is required".to_string()))?;

    let claims = state
        .jwt_service
        .verify_refresh(&presented)
        .map_err(|_| DomainError::Authorization("Invalid refresh token".to_string()))?;

    let user_id = claims
        .sub
        .ok_or_else(|| DomainError::Authorization("Invalid refresh token".to_string()))?;

    let record = state
        .token_store
        .find_refresh(&presented)
        .await?
        .ok_or_else(|| {
            // A concurrent refresh may have rotated this token away already.
            DomainError::Authorization("Refresh token not found in database".to_string())
        })?;

    if record.revoked {
        return Err(DomainError::Authorization("Refresh token revoked".to_string()).into());
    }

    if crate::token_store::TokenStore::is_expired(&record) {
        if let Err(e) = state.token_store.delete_refresh(&presented).await {
            warn!("Failed to delete expired refresh record: {}", e);
        }
        return Err(DomainError::Authorization("Refresh token expired".to_string()).into());
    }

    // The cache mirror is advisory except here: both stores holding a
    // value that disagrees means a newer session is active.
    let reconciliation = state.token_store.reconcile(user_id, &presented).await;
    if reconciliation.matches == Some(false) {
        return Err(DomainError::Authorization(
            "A different session might be active".to_string(),
        )
        .into());
    }

    let user = state
        .user_repository
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| DomainError::Authorization("User not found".to_string()))?;

    let role = state
        .role_repository
        .find_by_id(user.role_id)
        .await?
        .ok_or_else(|| AuthError::Internal("Role not found".to_string()))?;

    // Delete the old record before minting the replacement's mirror; the
    // two writes are not transactional, and a racing refresh that loses
    // observes "not found" above rather than a crash.
    if let Err(e) = state.token_store.delete_refresh(&presented).await {
        warn!("Failed to delete rotated refresh record: {}", e);
    }

    let (token, refresh) = issue_session(&state, &user, &role, &headers).await?;

    Ok((
        StatusCode::OK,
        Json(RefreshTokenResponse {
            token,
            refresh_token: refresh.token,
        }),
    ))
}

/// Permission check endpoint.
///
/// With a `role` query parameter the check runs against that role instead
/// of the caller's own claims.
pub async fn check_permission(
    State(state): State<AppState>,
    axum::Extension(context): axum::Extension<AuthContext>,
    Query(query): Query<CheckPermissionQuery>,
) -> AuthResult<impl IntoResponse> {
    let effective = match query.role {
        Some(role) => AuthContext {
            admin: context.admin || role == "admin",
            role,
            role_id: None,
            permissions: vec![],
            ..context
        },
        None => context,
    };

    let decision = authorize(Some(&effective), &query.permission, &state.role_repository)
        .await
        .map_err(|e| {
            error!("Permission resolution failed: {}", e);
            AuthError::Internal("Internal server error".to_string())
        })?;

    Ok(Json(serde_json::json!({
        "hasAccess": decision == Decision::Allow,
    })))
}

/// Current identity endpoint
pub async fn me(
    State(state): State<AppState>,
    axum::Extension(context): axum::Extension<AuthContext>,
) -> AuthResult<impl IntoResponse> {
    let user = state
        .user_repository
        .find_by_id(context.id)
        .await?
        .ok_or_else(|| DomainError::NotFound("User".to_string()))?;

    Ok(Json(serde_json::json!({
        "isAuthenticated": true,
        "user": user,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::Blacklist;
    use crate::jwt::{JwtConfig, JwtService};
    use crate::repositories::{RoleRepository, TokenRepository, UserRepository};
    use crate::token_store::TokenStore;
    use axum::body::to_bytes;
    use common::cache::{RedisConfig, RedisPool};
    use common::database::{DatabaseConfig, init_pool};
    use sqlx::Row;
    use uuid::Uuid;

    fn test_jwt_config() -> JwtConfig {
        JwtConfig {
            access_secret: "route-test-access".to_string(),
            refresh_secret: "route-test-refresh".to_string(),
            legacy_secrets: vec![],
            access_token_expiry: 3600,
            refresh_token_expiry: 604_800,
        }
    }

    async fn test_state() -> AppState {
        let pool = init_pool(&DatabaseConfig::from_env().expect("config loads"))
            .await
            .expect("database reachable");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations apply");

        let redis_pool = RedisPool::connect(&RedisConfig::from_env().expect("config loads"))
            .expect("client construction is offline");

        let token_repository = TokenRepository::new(pool.clone());
        AppState {
            db_pool: pool.clone(),
            jwt_service: JwtService::new(test_jwt_config()),
            user_repository: UserRepository::new(pool.clone()),
            role_repository: RoleRepository::new(pool.clone()),
            token_store: TokenStore::new(token_repository, redis_pool.clone()),
            blacklist: Blacklist::new(redis_pool),
        }
    }

    fn unique(prefix: &str) -> String {
        format!("{prefix}{}", &Uuid::new_v4().simple().to_string()[..20])
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body reads");
        serde_json::from_slice(&bytes).expect("body is json")
    }

    async fn signup_user(state: &AppState, username: &str, password: &str) -> serde_json::Value {
        let resp = signup(
            State(state.clone()),
            HeaderMap::new(),
            Json(SignupRequest {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                name: None,
                password: password.to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp).await
    }

    #[tokio::test]
    #[ignore = "requires local PostgreSQL and Redis instances"]
    async fn test_signup_refresh_claim_carries_default_role_id() {
        let state = test_state().await;
        // An 8-character password is the accepted minimum.
        let body = signup_user(&state, &unique("sa"), "12345678").await;

        let default_role = state
            .role_repository
            .find_by_name("user")
            .await
            .expect("lookup succeeds")
            .expect("default role is seeded");

        let refresh = body["refreshToken"].as_str().expect("refresh token present");
        let claims = state
            .jwt_service
            .verify_refresh(refresh)
            .expect("verification succeeds");
        assert_eq!(claims.role, default_role.id.to_string());
    }

    #[tokio::test]
    #[ignore = "requires local PostgreSQL and Redis instances"]
    async fn test_login_with_soft_deleted_role_reports_role_not_found() {
        let state = test_state().await;
        let username = unique("sb");
        signup_user(&state, &username, "12345678").await;

        // Park the user on a role, then soft-delete the role behind them.
        let row = sqlx::query("INSERT INTO roles (name) VALUES ($1) RETURNING id")
            .bind(unique("role_"))
            .fetch_one(&state.db_pool)
            .await
            .expect("role insert succeeds");
        let role_id: Uuid = row.get("id");

        sqlx::query("UPDATE users SET role_id = $1 WHERE username = $2")
            .bind(role_id)
            .bind(&username)
            .execute(&state.db_pool)
            .await
            .expect("user update succeeds");
        sqlx::query("UPDATE roles SET deleted = TRUE WHERE id = $1")
            .bind(role_id)
            .execute(&state.db_pool)
            .await
            .expect("role delete succeeds");

        let resp = login(
            State(state.clone()),
            HeaderMap::new(),
            Json(LoginRequest {
                username_or_email: username,
                password: "12345678".to_string(),
            }),
        )
        .await
        .into_response();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "Role not found");
    }

    #[tokio::test]
    #[ignore = "requires local PostgreSQL and Redis instances"]
    async fn test_second_refresh_with_rotated_token_is_rejected() {
        let state = test_state().await;
        let body = signup_user(&state, &unique("sc"), "12345678").await;
        let refresh = body["refreshToken"]
            .as_str()
            .expect("refresh token present")
            .to_string();

        let first = refresh_token(
            State(state.clone()),
            HeaderMap::new(),
            Json(RefreshTokenRequest {
                refresh_token: Some(refresh.clone()),
            }),
        )
        .await
        .into_response();
        assert_eq!(first.status(), StatusCode::OK);

        // The first call rotated the record away; replaying the original
        // token must fail on the durable lookup.
        let second = refresh_token(
            State(state.clone()),
            HeaderMap::new(),
            Json(RefreshTokenRequest {
                refresh_token: Some(refresh),
            }),
        )
        .await
        .into_response();
        assert_eq!(second.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(second).await["error"],
            "Refresh token not found in database"
        );
    }

    #[tokio::test]
    #[ignore = "requires local PostgreSQL and Redis instances"]
    async fn test_expired_refresh_is_deleted_on_the_rejecting_call() {
        let state = test_state().await;
        let body = signup_user(&state, &unique("sd"), "12345678").await;
        let user_id: Uuid =
            serde_json::from_value(body["user"]["id"].clone()).expect("user id present");
        let user = state
            .user_repository
            .find_by_id(user_id)
            .await
            .expect("lookup succeeds")
            .expect("user exists");

        // Persist a refresh record that is already hours past expiry.
        let expired_issuer = JwtService::new(JwtConfig {
            refresh_token_expiry: -7200,
            ..test_jwt_config()
        });
        let issued = expired_issuer
            .issue_refresh_token(&user)
            .expect("issuance succeeds");
        state
            .token_store
            .persist_refresh(&NewTokenRecord {
                token: issued.token.clone(),
                user_id,
                kind: TokenKind::Refresh,
                expires_at: issued.expires_at,
                user_agent: None,
                ip: None,
            })
            .await
            .expect("insert succeeds");

        let resp = refresh_token(
            State(state.clone()),
            HeaderMap::new(),
            Json(RefreshTokenRequest {
                refresh_token: Some(issued.token.clone()),
            }),
        )
        .await
        .into_response();

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(resp).await["error"], "Refresh token expired");

        // The rejecting call must also have removed the durable row.
        let leftover = state
            .token_store
            .find_refresh(&issued.token)
            .await
            .expect("lookup succeeds");
        assert!(leftover.is_none());
    }

    #[tokio::test]
    #[ignore = "requires local PostgreSQL and Redis instances"]
    async fn test_duplicate_insert_maps_to_validation_error() {
        let state = test_state().await;
        let username = unique("se");
        let role = state
            .role_repository
            .find_by_name("user")
            .await
            .expect("lookup succeeds")
            .expect("default role is seeded");

        let new_user = NewUser {
            username: username.clone(),
            email: format!("{username}@example.com"),
            name: None,
            password_hash: "unused-digest".to_string(),
            role_id: role.id,
        };
        state
            .user_repository
            .create(&new_user)
            .await
            .expect("first insert succeeds");

        // Losing the check-then-insert race means hitting the unique index
        // directly; the mapped error must stay a validation failure.
        let err = state
            .user_repository
            .create(&new_user)
            .await
            .expect_err("unique index rejects the duplicate");
        assert!(matches!(
            map_creation_error(err),
            AuthError::Domain(DomainError::Validation(_))
        ));
    }
}
