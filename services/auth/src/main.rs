use anyhow::Result;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

mod blacklist;
mod error;
mod jwt;
mod middleware;
mod models;
mod password;
mod permission;
mod repositories;
mod routes;
mod state;
mod token_store;
mod validation;

use common::cache::{RedisConfig, RedisPool};
use common::database::{DatabaseConfig, health_check, init_pool};

use crate::{
    blacklist::Blacklist,
    jwt::{JwtConfig, JwtService},
    repositories::{RoleRepository, TokenRepository, UserRepository},
    state::AppState,
    token_store::TokenStore,
};

/// Days an expired token record stays queryable before the sweeper removes it
const TOKEN_PURGE_GRACE_DAYS: i64 = 30;
/// How often the sweeper runs
const TOKEN_PURGE_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting authentication service");

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    sqlx::migrate!("./migrations").run(&pool).await?;

    // Initialize JWT service
    let jwt_config = JwtConfig::from_env()?;
    let jwt_service = JwtService::new(jwt_config);

    // Initialize Redis handle
    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::connect(&redis_config)?;

    let user_repository = UserRepository::new(pool.clone());
    let role_repository = RoleRepository::new(pool.clone());
    let token_repository = TokenRepository::new(pool.clone());
    let token_store = TokenStore::new(token_repository, redis_pool.clone());
    let blacklist = Blacklist::new(redis_pool);

    // Background sweep of token records past the audit grace window
    let sweeper = token_store.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(TOKEN_PURGE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match sweeper.purge_expired(TOKEN_PURGE_GRACE_DAYS).await {
                Ok(0) => {}
                Ok(purged) => info!("Purged {} expired token records", purged),
                Err(e) => warn!("Token purge failed: {}", e),
            }
        }
    });

    let app_state = AppState {
        db_pool: pool,
        jwt_service,
        user_repository,
        role_repository,
        token_store,
        blacklist,
    };

    info!("Authentication service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Authentication service listening on 0.0.0.0:3000");

    axum::serve(listener, app).await?;

    Ok(())
}
