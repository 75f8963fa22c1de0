use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::{inserted_id, role_metadata, role_permission, unique_or_internal};
use crate::db::{self, Tx};
use crate::errors::{db_error, AppError, AppResult};
use crate::models::role::{DbRole, Role, RoleCreateRequest, RoleUpdateRequest, ROLE_CODE_TEMPLATE_PREFIX};

const ROLE_COLUMNS: &str = "id, tenant_id, code, name, description, status, data_scope, is_system, \
     is_protected, sort_order, created_by, created_at, updated_at";

fn into_roles(rows: Vec<DbRole>) -> AppResult<Vec<Role>> {
    rows.into_iter().map(Role::try_from).collect()
}

/// All roles, unpaginated, ordered by tenant then sort order.
pub async fn list(pool: &SqlitePool) -> AppResult<Vec<Role>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY tenant_id, sort_order, id");
    let rows = sqlx::query_as::<_, DbRole>(&sql)
        .fetch_all(pool)
        .await
        .map_err(db_error("list roles failed"))?;

    into_roles(rows)
}

pub async fn list_by_tenant(pool: &SqlitePool, tenant_id: u32) -> AppResult<Vec<Role>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE tenant_id = ? ORDER BY sort_order, id");
    let rows = sqlx::query_as::<_, DbRole>(&sql)
        .bind(tenant_id)
        .fetch_all(pool)
        .await
        .map_err(db_error("list tenant roles failed"))?;

    into_roles(rows)
}

pub async fn find(pool: &SqlitePool, id: u32) -> AppResult<Option<Role>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?");
    let row = sqlx::query_as::<_, DbRole>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("get role failed"))?;

    row.map(Role::try_from).transpose()
}

/// Role with its permission ids filled in.
pub async fn get(pool: &SqlitePool, id: u32) -> AppResult<Role> {
    let mut role = find(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("role {id} does not exist")))?;
    role.permissions = role_permission::list_permission_ids(pool, id).await?;
    Ok(role)
}

pub async fn find_by_code(pool: &SqlitePool, tenant_id: u32, code: &str) -> AppResult<Option<Role>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE tenant_id = ? AND code = ?");
    let row = sqlx::query_as::<_, DbRole>(&sql)
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(pool)
        .await
        .map_err(db_error("get role by code failed"))?;

    row.map(Role::try_from).transpose()
}

pub async fn get_by_ids(pool: &SqlitePool, ids: &[u32]) -> AppResult<Vec<Role>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id IN ("));
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(") ORDER BY sort_order, id");

    let rows = qb
        .build_query_as::<DbRole>()
        .fetch_all(pool)
        .await
        .map_err(db_error("get roles by ids failed"))?;

    into_roles(rows)
}

pub async fn codes_by_ids(pool: &SqlitePool, ids: &[u32]) -> AppResult<Vec<String>> {
    Ok(get_by_ids(pool, ids)
        .await?
        .into_iter()
        .map(|role| role.code)
        .collect())
}

pub async fn ids_by_codes(pool: &SqlitePool, tenant_id: u32, codes: &[String]) -> AppResult<Vec<u32>> {
    if codes.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id FROM roles WHERE tenant_id = ");
    qb.push_bind(tenant_id).push(" AND code IN (");
    let mut sep = qb.separated(", ");
    for code in codes {
        sep.push_bind(code.as_str());
    }
    sep.push_unseparated(") ORDER BY id");

    qb.build_query_scalar::<u32>()
        .fetch_all(pool)
        .await
        .map_err(db_error("get role ids by codes failed"))
}

/// Inserts the role and, when given, its permission set in one transaction.
pub async fn create(pool: &SqlitePool, req: RoleCreateRequest, operator_id: Option<u32>) -> AppResult<Role> {
    let mut tx = db::begin(pool).await?;
    let result = create_in_tx(&mut tx, req, operator_id).await;
    let id = db::finish(tx, result).await?;

    get(pool, id).await
}

pub(crate) async fn create_in_tx(
    tx: &mut Tx<'_>,
    req: RoleCreateRequest,
    operator_id: Option<u32>,
) -> AppResult<u32> {
    let code = req
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("role code is required"))?;
    let name = req
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("role name is required"))?;
    let tenant_id = req.tenant_id.unwrap_or_default();

    let result = sqlx::query(
        "INSERT INTO roles (tenant_id, code, name, description, status, data_scope, is_system, is_protected, sort_order, created_by, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(tenant_id)
    .bind(&code)
    .bind(&name)
    .bind(req.description.as_deref())
    .bind(req.status.unwrap_or_default().as_str())
    .bind(req.data_scope.unwrap_or_default().as_str())
    .bind(req.is_system.unwrap_or(false))
    .bind(req.is_protected.unwrap_or(false))
    .bind(req.sort_order.unwrap_or(0))
    .bind(operator_id)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map_err(unique_or_internal("create role failed", "role code already exists in tenant"))?;

    let id = inserted_id(result)?;

    if let Some(template_for) = code.strip_prefix(ROLE_CODE_TEMPLATE_PREFIX) {
        role_metadata::mark_template(tx, id, template_for).await?;
    }

    if let Some(permission_ids) = req.permissions {
        role_permission::assign(tx, tenant_id, id, &permission_ids, operator_id).await?;
    }

    tracing::info!(role_id = id, tenant_id, code = %code, "role created");
    Ok(id)
}

pub async fn update(
    pool: &SqlitePool,
    id: u32,
    req: RoleUpdateRequest,
    operator_id: Option<u32>,
) -> AppResult<Role> {
    let existing = find(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("role {id} does not exist")))?;

    let mut tx = db::begin(pool).await?;
    let result = update_in_tx(&mut tx, existing, req, operator_id).await;
    db::finish(tx, result).await?;

    get(pool, id).await
}

pub(crate) async fn update_in_tx(
    tx: &mut Tx<'_>,
    existing: Role,
    req: RoleUpdateRequest,
    operator_id: Option<u32>,
) -> AppResult<()> {
    if matches!(req.code.as_deref(), Some(c) if c.trim().is_empty()) {
        return Err(AppError::bad_request("role code must not be empty"));
    }

    sqlx::query(
        "UPDATE roles SET code = ?, name = ?, description = ?, status = ?, data_scope = ?, is_protected = ?, \
         sort_order = ?, updated_by = ?, updated_at = ? WHERE id = ?",
    )
    .bind(req.code.as_deref().unwrap_or(&existing.code))
    .bind(req.name.as_deref().unwrap_or(&existing.name))
    .bind(req.description.as_deref().or(existing.description.as_deref()))
    .bind(req.status.unwrap_or(existing.status).as_str())
    .bind(req.data_scope.unwrap_or(existing.data_scope).as_str())
    .bind(req.is_protected.unwrap_or(existing.is_protected))
    .bind(req.sort_order.unwrap_or(existing.sort_order))
    .bind(operator_id)
    .bind(Utc::now())
    .bind(existing.id)
    .execute(&mut **tx)
    .await
    .map_err(unique_or_internal("update role failed", "role code already exists in tenant"))?;

    if let Some(permission_ids) = req.permissions {
        role_permission::assign(tx, existing.tenant_id, existing.id, &permission_ids, operator_id).await?;
    }

    Ok(())
}

/// Deletes the role together with its permission rows and metadata. Protected roles
/// are refused.
pub async fn delete(pool: &SqlitePool, id: u32) -> AppResult<()> {
    let role = find(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("role {id} does not exist")))?;

    if role.is_protected {
        return Err(AppError::forbidden(format!("role {} is protected", role.code)));
    }

    let mut tx = db::begin(pool).await?;
    let result = delete_in_tx(&mut tx, id).await;
    db::finish(tx, result).await?;

    tracing::info!(role_id = id, code = %role.code, "role deleted");
    Ok(())
}

async fn delete_in_tx(tx: &mut Tx<'_>, id: u32) -> AppResult<()> {
    role_permission::clean_for_role(tx, id).await?;
    role_metadata::delete(tx, id).await?;

    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(db_error("delete role failed"))?;

    Ok(())
}
