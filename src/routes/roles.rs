//! Role administration, including template seeding and copy sync.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::middleware::Viewer;
use crate::models::permission::AssignIdsRequest;
use crate::models::role::{Role, RoleCreateRequest, RoleMetadata, RoleUpdateRequest, SeedFromTemplateRequest};
use crate::store::{role, role_metadata, role_permission};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:id", get(get_role).put(update_role).delete(delete_role))
        .route("/roles/:id/permissions", delete(remove_role_permissions))
        .route("/roles/:id/metadata", get(get_role_metadata))
        .route("/roles/:id/seed", post(seed_role))
        .route("/roles/:id/sync", post(sync_template))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    pub template_id: u32,
    pub synced: usize,
}

/// Tenant admins only see and touch roles of their own tenant.
fn ensure_tenant_access(viewer: &Viewer, tenant_id: u32) -> AppResult<()> {
    if viewer.is_platform_admin || viewer.tenant_id == tenant_id {
        Ok(())
    } else {
        Err(AppError::forbidden("role belongs to another tenant"))
    }
}

async fn load_visible_role(state: &AppState, viewer: &Viewer, id: u32) -> AppResult<Role> {
    let role = role::get(&state.pool, id).await?;
    ensure_tenant_access(viewer, role.tenant_id)?;
    Ok(role)
}

#[utoipa::path(
    get,
    path = "/admin/v1/roles",
    tag = "Roles",
    responses((status = 200, description = "Roles visible to the caller", body = Vec<Role>)),
    security(("bearer_auth" = []))
)]
pub async fn list_roles(State(state): State<AppState>, viewer: Viewer) -> AppResult<Json<Vec<Role>>> {
    let roles = if viewer.is_platform_admin {
        role::list(&state.pool).await?
    } else {
        role::list_by_tenant(&state.pool, viewer.tenant_id).await?
    };
    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/admin/v1/roles",
    tag = "Roles",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Code or name missing"),
        (status = 409, description = "Role code already exists in tenant")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(mut req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    req.tenant_id = Some(match req.tenant_id {
        Some(tenant_id) if viewer.is_platform_admin => tenant_id,
        _ => viewer.tenant_id,
    });

    let created = role::create(&state.pool, req, Some(viewer.user_id)).await?;
    state.authorizer.reset_policies_logged(&state.pool, "role created").await;

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/admin/v1/roles/{id}",
    tag = "Roles",
    params(("id" = u32, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role with its permission ids", body = Role),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_role(State(state): State<AppState>, viewer: Viewer, Path(id): Path<u32>) -> AppResult<Json<Role>> {
    Ok(Json(load_visible_role(&state, &viewer, id).await?))
}

#[utoipa::path(
    put,
    path = "/admin/v1/roles/{id}",
    tag = "Roles",
    params(("id" = u32, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<u32>,
    Json(req): Json<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    let existing = load_visible_role(&state, &viewer, id).await?;
    let updated = role::update(&state.pool, id, req, Some(viewer.user_id)).await?;

    if existing.is_template_code() || role_metadata::is_template(&state.pool, id).await? {
        role_metadata::sync_copies(&state.pool, id, Some(viewer.user_id)).await?;
    }

    state.authorizer.reset_policies_logged(&state.pool, "role updated").await;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/admin/v1/roles/{id}",
    tag = "Roles",
    params(("id" = u32, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role and its permission links deleted"),
        (status = 403, description = "Role is protected"),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_role(State(state): State<AppState>, viewer: Viewer, Path(id): Path<u32>) -> AppResult<StatusCode> {
    load_visible_role(&state, &viewer, id).await?;
    role::delete(&state.pool, id).await?;
    state.authorizer.reset_policies_logged(&state.pool, "role deleted").await;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/admin/v1/roles/{id}/permissions",
    tag = "Roles",
    params(("id" = u32, Path, description = "Role id")),
    request_body = AssignIdsRequest,
    responses((status = 200, description = "Remaining permission set", body = Role)),
    security(("bearer_auth" = []))
)]
pub async fn remove_role_permissions(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<u32>,
    Json(req): Json<AssignIdsRequest>,
) -> AppResult<Json<Role>> {
    load_visible_role(&state, &viewer, id).await?;
    role_permission::remove(&state.pool, id, &req.ids).await?;
    state.authorizer.reset_policies_logged(&state.pool, "role permissions removed").await;

    Ok(Json(role::get(&state.pool, id).await?))
}

#[utoipa::path(
    get,
    path = "/admin/v1/roles/{id}/metadata",
    tag = "Roles",
    params(("id" = u32, Path, description = "Role id")),
    responses(
        (status = 200, description = "Template or copy metadata", body = RoleMetadata),
        (status = 404, description = "Role has no metadata")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_role_metadata(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<u32>,
) -> AppResult<Json<RoleMetadata>> {
    load_visible_role(&state, &viewer, id).await?;
    role_metadata::get(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("role {id} has no metadata")))
}

#[utoipa::path(
    post,
    path = "/admin/v1/roles/{id}/seed",
    tag = "Roles",
    params(("id" = u32, Path, description = "Template role id")),
    request_body = SeedFromTemplateRequest,
    responses(
        (status = 201, description = "Tenant role seeded from the template", body = Role),
        (status = 400, description = "Role is not a template"),
        (status = 409, description = "Tenant already has a role with that code")
    ),
    security(("bearer_auth" = []))
)]
pub async fn seed_role(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<u32>,
    Json(req): Json<SeedFromTemplateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    ensure_tenant_access(&viewer, req.tenant_id)?;

    let seeded =
        role_metadata::seed_from_template(&state.pool, id, req.tenant_id, req.sync_policy, Some(viewer.user_id))
            .await?;
    state.authorizer.reset_policies_logged(&state.pool, "role seeded").await;

    Ok((StatusCode::CREATED, Json(seeded)))
}

#[utoipa::path(
    post,
    path = "/admin/v1/roles/{id}/sync",
    tag = "Roles",
    params(("id" = u32, Path, description = "Template role id")),
    responses(
        (status = 200, description = "AUTO copies refreshed", body = SyncResponse),
        (status = 400, description = "Role is not a template")
    ),
    security(("bearer_auth" = []))
)]
pub async fn sync_template(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<u32>,
) -> AppResult<Json<SyncResponse>> {
    if !viewer.is_platform_admin {
        return Err(AppError::forbidden("only platform administrators manage templates"));
    }

    let synced = role_metadata::sync_copies(&state.pool, id, Some(viewer.user_id)).await?;
    state.authorizer.reset_policies_logged(&state.pool, "template synced").await;

    Ok(Json(SyncResponse { template_id: id, synced }))
}
