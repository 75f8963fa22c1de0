use std::sync::Arc;

use axum::http::Method;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::Authorizer;
use crate::config::AppConfig;
use crate::docs;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::middleware;
use crate::routes::{assignments, auth, health, permissions, resources, roles};
use crate::store::resource::ApiResourceCache;
use crate::token::UserTokenCache;

pub const API_PREFIX: &str = "/admin/v1";

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub tokens: Arc<UserTokenCache>,
    pub authorizer: Arc<Authorizer>,
    pub api_cache: ApiResourceCache,
    pub settings: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self {
            pool,
            jwt: Arc::new(config.jwt.clone()),
            tokens: Arc::new(UserTokenCache::new(config.tokens.clone())),
            authorizer: Arc::new(Authorizer::new(config.authz.engine)),
            api_cache: ApiResourceCache::new(),
            settings: Arc::new(config),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let config = AppConfig::from_env()?;
    create_app_with(pool, config).await
}

/// Builds the router around an explicit configuration and loads the initial policies.
pub async fn create_app_with(pool: SqlitePool, config: AppConfig) -> Result<Router, AppError> {
    let state = AppState::new(pool, config);
    state
        .authorizer
        .reset_policies_logged(&state.pool, "startup")
        .await;

    let openapi = docs::build_openapi(api_port())?;
    Ok(build_router(state).merge(docs::swagger_routes(openapi)))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let admin_routes = Router::new()
        .route("/health", get(health::health))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .merge(roles::routes())
        .merge(permissions::routes())
        .merge(assignments::routes())
        .merge(resources::routes());

    // Layers run bottom-up: the operation log wraps the authorization check.
    Router::new()
        .nest(API_PREFIX, admin_routes)
        .route_layer(from_fn_with_state(state.clone(), middleware::authorize))
        .route_layer(from_fn_with_state(state.clone(), middleware::operation_log))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn api_port() -> u16 {
    std::env::var("APP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8000)
}
