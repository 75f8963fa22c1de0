use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::middleware::Viewer;
use crate::models::permission::{
    AssignIdsRequest, Permission, PermissionCreateRequest, PermissionGroup, PermissionGroupCreateRequest,
    PermissionUpdateRequest,
};
use crate::store::{permission, permission_graph};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/permissions", get(list_permissions).post(create_permission))
        .route(
            "/permissions/:id",
            get(get_permission).put(update_permission).delete(delete_permission),
        )
        .route("/permissions/:id/apis", put(assign_permission_apis))
        .route("/permissions/:id/menus", put(assign_permission_menus))
        .route("/permission-groups", get(list_permission_groups).post(create_permission_group))
}

fn effective_tenant(viewer: &Viewer, requested: Option<u32>) -> u32 {
    match requested {
        Some(tenant_id) if viewer.is_platform_admin => tenant_id,
        _ => viewer.tenant_id,
    }
}

async fn load_visible_permission(state: &AppState, viewer: &Viewer, id: u32) -> AppResult<Permission> {
    let found = permission::get(&state.pool, id).await?;
    if !viewer.is_platform_admin && found.tenant_id != viewer.tenant_id {
        return Err(AppError::forbidden("permission belongs to another tenant"));
    }
    Ok(found)
}

#[utoipa::path(
    get,
    path = "/admin/v1/permissions",
    tag = "Permissions",
    responses((status = 200, description = "Permissions visible to the caller", body = Vec<Permission>)),
    security(("bearer_auth" = []))
)]
pub async fn list_permissions(State(state): State<AppState>, viewer: Viewer) -> AppResult<Json<Vec<Permission>>> {
    let mut permissions = permission::list(&state.pool).await?;
    if !viewer.is_platform_admin {
        permissions.retain(|p| p.tenant_id == viewer.tenant_id);
    }
    Ok(Json(permissions))
}

#[utoipa::path(
    post,
    path = "/admin/v1/permissions",
    tag = "Permissions",
    request_body = PermissionCreateRequest,
    responses(
        (status = 201, description = "Permission created with its API and menu sets", body = Permission),
        (status = 400, description = "Code missing"),
        (status = 409, description = "Permission code already exists in tenant")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(mut req): Json<PermissionCreateRequest>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    req.tenant_id = Some(effective_tenant(&viewer, req.tenant_id));

    let created = permission::create(&state.pool, req).await?;
    state.authorizer.reset_policies_logged(&state.pool, "permission created").await;

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/admin/v1/permissions/{id}",
    tag = "Permissions",
    params(("id" = u32, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission with API and menu ids", body = Permission),
        (status = 404, description = "Permission not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_permission(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<u32>,
) -> AppResult<Json<Permission>> {
    Ok(Json(load_visible_permission(&state, &viewer, id).await?))
}

#[utoipa::path(
    put,
    path = "/admin/v1/permissions/{id}",
    tag = "Permissions",
    params(("id" = u32, Path, description = "Permission id")),
    request_body = PermissionUpdateRequest,
    responses(
        (status = 200, description = "Permission updated", body = Permission),
        (status = 404, description = "Permission not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_permission(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<u32>,
    Json(req): Json<PermissionUpdateRequest>,
) -> AppResult<Json<Permission>> {
    load_visible_permission(&state, &viewer, id).await?;
    let updated = permission::update(&state.pool, id, req).await?;
    state.authorizer.reset_policies_logged(&state.pool, "permission updated").await;

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/admin/v1/permissions/{id}",
    tag = "Permissions",
    params(("id" = u32, Path, description = "Permission id")),
    responses(
        (status = 204, description = "Permission and its API, menu and role links deleted"),
        (status = 404, description = "Permission not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<u32>,
) -> AppResult<StatusCode> {
    load_visible_permission(&state, &viewer, id).await?;
    permission::delete(&state.pool, id).await?;
    state.authorizer.reset_policies_logged(&state.pool, "permission deleted").await;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/admin/v1/permissions/{id}/apis",
    tag = "Permissions",
    params(("id" = u32, Path, description = "Permission id")),
    request_body = AssignIdsRequest,
    responses((status = 200, description = "API set replaced", body = Permission)),
    security(("bearer_auth" = []))
)]
pub async fn assign_permission_apis(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<u32>,
    Json(req): Json<AssignIdsRequest>,
) -> AppResult<Json<Permission>> {
    let current = load_visible_permission(&state, &viewer, id).await?;
    permission_graph::assign_apis_to_permission(&state.pool, current.tenant_id, id, &req.ids).await?;
    state.authorizer.reset_policies_logged(&state.pool, "permission apis assigned").await;

    Ok(Json(permission::get(&state.pool, id).await?))
}

#[utoipa::path(
    put,
    path = "/admin/v1/permissions/{id}/menus",
    tag = "Permissions",
    params(("id" = u32, Path, description = "Permission id")),
    request_body = AssignIdsRequest,
    responses((status = 200, description = "Menu set replaced", body = Permission)),
    security(("bearer_auth" = []))
)]
pub async fn assign_permission_menus(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<u32>,
    Json(req): Json<AssignIdsRequest>,
) -> AppResult<Json<Permission>> {
    let current = load_visible_permission(&state, &viewer, id).await?;
    permission_graph::assign_menus_to_permission(&state.pool, current.tenant_id, id, &req.ids).await?;
    state.authorizer.reset_policies_logged(&state.pool, "permission menus assigned").await;

    Ok(Json(permission::get(&state.pool, id).await?))
}

#[utoipa::path(
    get,
    path = "/admin/v1/permission-groups",
    tag = "Permissions",
    responses((status = 200, description = "Permission groups", body = Vec<PermissionGroup>)),
    security(("bearer_auth" = []))
)]
pub async fn list_permission_groups(
    State(state): State<AppState>,
    viewer: Viewer,
) -> AppResult<Json<Vec<PermissionGroup>>> {
    let mut groups = permission::list_groups(&state.pool).await?;
    if !viewer.is_platform_admin {
        groups.retain(|g| g.tenant_id == viewer.tenant_id);
    }
    Ok(Json(groups))
}

#[utoipa::path(
    post,
    path = "/admin/v1/permission-groups",
    tag = "Permissions",
    request_body = PermissionGroupCreateRequest,
    responses(
        (status = 201, description = "Group created under its parent", body = PermissionGroup),
        (status = 404, description = "Parent group not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_permission_group(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(mut req): Json<PermissionGroupCreateRequest>,
) -> AppResult<(StatusCode, Json<PermissionGroup>)> {
    req.tenant_id = Some(effective_tenant(&viewer, req.tenant_id));
    let group = permission::create_group(&state.pool, req).await?;

    Ok((StatusCode::CREATED, Json(group)))
}
