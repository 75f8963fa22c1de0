//! Role, org-unit and position assignments for users and memberships.
//!
//! `/users/{id}/{relation}` and `/memberships/{id}/{relation}` share one set of
//! handlers; `relation` is `roles`, `org-units` or `positions`.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::middleware::Viewer;
use crate::models::assignment::{
    Assignment, RelationKind, RemoveAssignmentsRequest, ReplaceAssignmentsRequest, SubjectKind,
};
use crate::store::AssignmentStore;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:id/:relation",
            get(list_user_assignments)
                .put(replace_user_assignments)
                .delete(remove_user_assignments),
        )
        .route(
            "/memberships/:id/:relation",
            get(list_membership_assignments)
                .put(replace_membership_assignments)
                .delete(remove_membership_assignments),
        )
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TenantQuery {
    /// Defaults to the caller's tenant.
    pub tenant_id: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemovedResponse {
    pub removed: u64,
}

fn scoped_tenant(viewer: &Viewer, requested: Option<u32>) -> AppResult<u32> {
    match requested {
        None => Ok(viewer.tenant_id),
        Some(tenant_id) if viewer.is_platform_admin || tenant_id == viewer.tenant_id => Ok(tenant_id),
        Some(_) => Err(AppError::forbidden("assignments of another tenant are not accessible")),
    }
}

fn store_for(subject: SubjectKind, relation: &str) -> AppResult<AssignmentStore> {
    let relation: RelationKind = relation.parse()?;
    Ok(AssignmentStore::new(subject, relation))
}

async fn list_assignments(
    state: AppState,
    viewer: Viewer,
    subject: SubjectKind,
    (id, relation): (u32, String),
    query: TenantQuery,
) -> AppResult<Json<Vec<Assignment>>> {
    let store = store_for(subject, &relation)?;
    let tenant_id = scoped_tenant(&viewer, query.tenant_id)?;

    Ok(Json(store.list(&state.pool, id, tenant_id).await?))
}

async fn replace_assignments(
    state: AppState,
    viewer: Viewer,
    subject: SubjectKind,
    (id, relation): (u32, String),
    req: ReplaceAssignmentsRequest,
) -> AppResult<Json<Vec<Assignment>>> {
    let store = store_for(subject, &relation)?;
    let tenant_id = scoped_tenant(&viewer, Some(req.tenant_id))?;

    let target_ids: Vec<u32> = req.items.iter().map(|item| item.target_id).collect();
    store.ensure_targets_in_tenant(&state.pool, tenant_id, &target_ids).await?;

    store
        .replace(&state.pool, id, tenant_id, &req.items, Some(viewer.user_id))
        .await?;
    state
        .authorizer
        .reset_policies_logged(&state.pool, "assignments replaced")
        .await;

    Ok(Json(store.list(&state.pool, id, tenant_id).await?))
}

async fn remove_assignments(
    state: AppState,
    viewer: Viewer,
    subject: SubjectKind,
    (id, relation): (u32, String),
    req: RemoveAssignmentsRequest,
) -> AppResult<Json<RemovedResponse>> {
    let store = store_for(subject, &relation)?;
    let tenant_id = scoped_tenant(&viewer, Some(req.tenant_id))?;

    let removed = store.remove(&state.pool, id, tenant_id, &req.target_ids).await?;
    tracing::info!(table = %store.table(), subject_id = id, tenant_id, removed, "assignments removed");
    state
        .authorizer
        .reset_policies_logged(&state.pool, "assignments removed")
        .await;

    Ok(Json(RemovedResponse { removed }))
}

// =============================================================================
// USERS
// =============================================================================

#[utoipa::path(
    get,
    path = "/admin/v1/users/{id}/{relation}",
    tag = "Assignments",
    params(
        ("id" = u32, Path, description = "User id"),
        ("relation" = String, Path, description = "roles, org-units or positions"),
        TenantQuery
    ),
    responses((status = 200, description = "Assignment rows in the tenant", body = Vec<Assignment>)),
    security(("bearer_auth" = []))
)]
pub async fn list_user_assignments(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(path): Path<(u32, String)>,
    Query(query): Query<TenantQuery>,
) -> AppResult<Json<Vec<Assignment>>> {
    list_assignments(state, viewer, SubjectKind::User, path, query).await
}

#[utoipa::path(
    put,
    path = "/admin/v1/users/{id}/{relation}",
    tag = "Assignments",
    params(
        ("id" = u32, Path, description = "User id"),
        ("relation" = String, Path, description = "roles, org-units or positions")
    ),
    request_body = ReplaceAssignmentsRequest,
    responses(
        (status = 200, description = "The tenant's set replaced by exactly the given items", body = Vec<Assignment>),
        (status = 400, description = "Unknown relation"),
        (status = 403, description = "Tenant not accessible or a target owned by another tenant")
    ),
    security(("bearer_auth" = []))
)]
pub async fn replace_user_assignments(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(path): Path<(u32, String)>,
    Json(req): Json<ReplaceAssignmentsRequest>,
) -> AppResult<Json<Vec<Assignment>>> {
    replace_assignments(state, viewer, SubjectKind::User, path, req).await
}

#[utoipa::path(
    delete,
    path = "/admin/v1/users/{id}/{relation}",
    tag = "Assignments",
    params(
        ("id" = u32, Path, description = "User id"),
        ("relation" = String, Path, description = "roles, org-units or positions")
    ),
    request_body = RemoveAssignmentsRequest,
    responses((status = 200, description = "Listed targets removed", body = RemovedResponse)),
    security(("bearer_auth" = []))
)]
pub async fn remove_user_assignments(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(path): Path<(u32, String)>,
    Json(req): Json<RemoveAssignmentsRequest>,
) -> AppResult<Json<RemovedResponse>> {
    remove_assignments(state, viewer, SubjectKind::User, path, req).await
}

// =============================================================================
// MEMBERSHIPS
// =============================================================================

#[utoipa::path(
    get,
    path = "/admin/v1/memberships/{id}/{relation}",
    tag = "Assignments",
    params(
        ("id" = u32, Path, description = "Membership id"),
        ("relation" = String, Path, description = "roles, org-units or positions"),
        TenantQuery
    ),
    responses((status = 200, description = "Assignment rows in the tenant", body = Vec<Assignment>)),
    security(("bearer_auth" = []))
)]
pub async fn list_membership_assignments(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(path): Path<(u32, String)>,
    Query(query): Query<TenantQuery>,
) -> AppResult<Json<Vec<Assignment>>> {
    list_assignments(state, viewer, SubjectKind::Membership, path, query).await
}

#[utoipa::path(
    put,
    path = "/admin/v1/memberships/{id}/{relation}",
    tag = "Assignments",
    params(
        ("id" = u32, Path, description = "Membership id"),
        ("relation" = String, Path, description = "roles, org-units or positions")
    ),
    request_body = ReplaceAssignmentsRequest,
    responses(
        (status = 200, description = "The tenant's set replaced by exactly the given items", body = Vec<Assignment>),
        (status = 403, description = "Tenant not accessible or a target owned by another tenant")
    ),
    security(("bearer_auth" = []))
)]
pub async fn replace_membership_assignments(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(path): Path<(u32, String)>,
    Json(req): Json<ReplaceAssignmentsRequest>,
) -> AppResult<Json<Vec<Assignment>>> {
    replace_assignments(state, viewer, SubjectKind::Membership, path, req).await
}

#[utoipa::path(
    delete,
    path = "/admin/v1/memberships/{id}/{relation}",
    tag = "Assignments",
    params(
        ("id" = u32, Path, description = "Membership id"),
        ("relation" = String, Path, description = "roles, org-units or positions")
    ),
    request_body = RemoveAssignmentsRequest,
    responses((status = 200, description = "Listed targets removed", body = RemovedResponse)),
    security(("bearer_auth" = []))
)]
pub async fn remove_membership_assignments(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(path): Path<(u32, String)>,
    Json(req): Json<RemoveAssignmentsRequest>,
) -> AppResult<Json<RemovedResponse>> {
    remove_assignments(state, viewer, SubjectKind::Membership, path, req).await
}
