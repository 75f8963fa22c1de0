//! API resources, menus, and the policy reload endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::provider::{self, CompiledPolicies};
use crate::errors::{AppError, AppResult};
use crate::middleware::Viewer;
use crate::models::resource::{ApiResource, ApiResourceCreateRequest, Menu, MenuCreateRequest};
use crate::store::resource;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api-resources", get(list_api_resources).post(create_api_resource))
        .route("/api-resources/refresh-cache", post(refresh_api_cache))
        .route("/api-resources/:id", delete(delete_api_resource))
        .route("/menus", get(list_menus).post(create_menu))
        .route("/policies", get(compiled_policies))
        .route("/policies/reset", post(reset_policies))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetPoliciesResponse {
    pub engine: &'static str,
    pub rules: usize,
}

fn require_platform_admin(viewer: &Viewer) -> AppResult<()> {
    if viewer.is_platform_admin {
        Ok(())
    } else {
        Err(AppError::forbidden("only platform administrators manage api resources"))
    }
}

#[utoipa::path(
    get,
    path = "/admin/v1/api-resources",
    tag = "Resources",
    responses((status = 200, description = "Registered API resources", body = Vec<ApiResource>)),
    security(("bearer_auth" = []))
)]
pub async fn list_api_resources(State(state): State<AppState>) -> AppResult<Json<Vec<ApiResource>>> {
    Ok(Json(resource::list_apis(&state.pool).await?))
}

#[utoipa::path(
    post,
    path = "/admin/v1/api-resources",
    tag = "Resources",
    request_body = ApiResourceCreateRequest,
    responses(
        (status = 201, description = "API resource registered", body = ApiResource),
        (status = 409, description = "Method and path already registered")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_api_resource(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(req): Json<ApiResourceCreateRequest>,
) -> AppResult<(StatusCode, Json<ApiResource>)> {
    require_platform_admin(&viewer)?;

    let api = resource::create_api(&state.pool, req).await?;
    state.authorizer.reset_policies_logged(&state.pool, "api resource created").await;

    Ok((StatusCode::CREATED, Json(api)))
}

#[utoipa::path(
    delete,
    path = "/admin/v1/api-resources/{id}",
    tag = "Resources",
    params(("id" = u32, Path, description = "API resource id")),
    responses(
        (status = 204, description = "API resource and its permission links deleted"),
        (status = 404, description = "API resource not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_api_resource(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<u32>,
) -> AppResult<StatusCode> {
    require_platform_admin(&viewer)?;

    resource::delete_api(&state.pool, id).await?;
    state.authorizer.reset_policies_logged(&state.pool, "api resource deleted").await;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/admin/v1/api-resources/refresh-cache",
    tag = "Resources",
    responses((status = 204, description = "API resource cache cleared")),
    security(("bearer_auth" = []))
)]
pub async fn refresh_api_cache(State(state): State<AppState>) -> StatusCode {
    state.api_cache.invalidate().await;
    tracing::info!("api resource cache cleared");
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    get,
    path = "/admin/v1/menus",
    tag = "Resources",
    responses((status = 200, description = "Menu rows", body = Vec<Menu>)),
    security(("bearer_auth" = []))
)]
pub async fn list_menus(State(state): State<AppState>) -> AppResult<Json<Vec<Menu>>> {
    Ok(Json(resource::list_menus(&state.pool).await?))
}

#[utoipa::path(
    post,
    path = "/admin/v1/menus",
    tag = "Resources",
    request_body = MenuCreateRequest,
    responses((status = 201, description = "Menu created", body = Menu)),
    security(("bearer_auth" = []))
)]
pub async fn create_menu(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(req): Json<MenuCreateRequest>,
) -> AppResult<(StatusCode, Json<Menu>)> {
    require_platform_admin(&viewer)?;

    let menu = resource::create_menu(&state.pool, req).await?;
    state.authorizer.reset_policies_logged(&state.pool, "menu created").await;

    Ok((StatusCode::CREATED, Json(menu)))
}

#[utoipa::path(
    get,
    path = "/admin/v1/policies",
    tag = "Policies",
    responses((status = 200, description = "Role code to endpoint map", body = HashMap<String, Vec<AuthorizerData>>)),
    security(("bearer_auth" = []))
)]
pub async fn compiled_policies(State(state): State<AppState>) -> AppResult<Json<CompiledPolicies>> {
    Ok(Json(provider::provide(&state.pool).await?))
}

#[utoipa::path(
    post,
    path = "/admin/v1/policies/reset",
    tag = "Policies",
    responses(
        (status = 200, description = "Engine reloaded from the database", body = ResetPoliciesResponse),
        (status = 500, description = "Compilation or engine load failed; previous policies stay active")
    ),
    security(("bearer_auth" = []))
)]
pub async fn reset_policies(State(state): State<AppState>) -> AppResult<Json<ResetPoliciesResponse>> {
    let rules = state.authorizer.reset_policies(&state.pool).await?;

    Ok(Json(ResetPoliciesResponse {
        engine: state.authorizer.kind().name(),
        rules,
    }))
}
