use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::permission_graph::{self, Junction};
use super::{inserted_id, role_permission, unique_or_internal};
use crate::db::{self, Tx};
use crate::errors::{db_error, AppError, AppResult};
use crate::models::permission::{
    DbPermission, Permission, PermissionCreateRequest, PermissionGroup, PermissionGroupCreateRequest,
    PermissionUpdateRequest,
};

const PERMISSION_COLUMNS: &str = "id, tenant_id, code, name, status, group_id, created_at, updated_at";

pub async fn list(pool: &SqlitePool) -> AppResult<Vec<Permission>> {
    let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY tenant_id, id");
    let rows = sqlx::query_as::<_, DbPermission>(&sql)
        .fetch_all(pool)
        .await
        .map_err(db_error("list permissions failed"))?;

    rows.into_iter().map(Permission::try_from).collect()
}

pub async fn find(pool: &SqlitePool, id: u32) -> AppResult<Option<Permission>> {
    let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = ?");
    let row = sqlx::query_as::<_, DbPermission>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("get permission failed"))?;

    row.map(Permission::try_from).transpose()
}

/// Permission with its API and menu ids filled in.
pub async fn get(pool: &SqlitePool, id: u32) -> AppResult<Permission> {
    let mut permission = find(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("permission {id} does not exist")))?;
    permission.api_ids = permission_graph::list_api_ids_for_permissions(pool, &[id]).await?;
    permission.menu_ids = permission_graph::list_menu_ids_for_permissions(pool, &[id]).await?;
    Ok(permission)
}

pub async fn codes_by_ids(pool: &SqlitePool, ids: &[u32]) -> AppResult<Vec<String>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT code FROM permissions WHERE id IN (");
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(") ORDER BY id");

    qb.build_query_scalar::<String>()
        .fetch_all(pool)
        .await
        .map_err(db_error("get permission codes failed"))
}

pub async fn ids_by_codes(pool: &SqlitePool, codes: &[String]) -> AppResult<Vec<u32>> {
    if codes.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id FROM permissions WHERE code IN (");
    let mut sep = qb.separated(", ");
    for code in codes {
        sep.push_bind(code.as_str());
    }
    sep.push_unseparated(") ORDER BY id");

    qb.build_query_scalar::<u32>()
        .fetch_all(pool)
        .await
        .map_err(db_error("get permission ids failed"))
}

pub async fn create(pool: &SqlitePool, req: PermissionCreateRequest) -> AppResult<Permission> {
    let code = req
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("permission code is required"))?;
    let name = req.name.unwrap_or_else(|| code.clone());
    let tenant_id = req.tenant_id.unwrap_or_default();

    let mut tx = db::begin(pool).await?;
    let result = async {
        let result = sqlx::query(
            "INSERT INTO permissions (tenant_id, code, name, status, group_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(tenant_id)
        .bind(code.as_str())
        .bind(name.as_str())
        .bind(req.status.unwrap_or_default().as_str())
        .bind(req.group_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(unique_or_internal("create permission failed", "permission code already exists"))?;

        let id = inserted_id(result)?;
        apply_junctions(&mut tx, tenant_id, id, req.api_ids.as_deref(), req.menu_ids.as_deref()).await?;
        Ok::<_, AppError>(id)
    }
    .await;
    let id = db::finish(tx, result).await?;

    tracing::info!(permission_id = id, code = %code, "permission created");
    get(pool, id).await
}

pub async fn update(pool: &SqlitePool, id: u32, req: PermissionUpdateRequest) -> AppResult<Permission> {
    let existing = find(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("permission {id} does not exist")))?;

    if matches!(req.code.as_deref(), Some(c) if c.trim().is_empty()) {
        return Err(AppError::bad_request("permission code must not be empty"));
    }

    let mut tx = db::begin(pool).await?;
    let result = async {
        sqlx::query(
            "UPDATE permissions SET code = ?, name = ?, status = ?, group_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(req.code.as_deref().unwrap_or(&existing.code))
        .bind(req.name.as_deref().unwrap_or(&existing.name))
        .bind(req.status.unwrap_or(existing.status).as_str())
        .bind(req.group_id.or(existing.group_id))
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(unique_or_internal("update permission failed", "permission code already exists"))?;

        apply_junctions(&mut tx, existing.tenant_id, id, req.api_ids.as_deref(), req.menu_ids.as_deref()).await
    }
    .await;
    db::finish(tx, result).await?;

    get(pool, id).await
}

async fn apply_junctions(
    tx: &mut Tx<'_>,
    tenant_id: u32,
    permission_id: u32,
    api_ids: Option<&[u32]>,
    menu_ids: Option<&[u32]>,
) -> AppResult<()> {
    if let Some(ids) = api_ids {
        permission_graph::assign(tx, Junction::Api, tenant_id, permission_id, ids).await?;
    }
    if let Some(ids) = menu_ids {
        permission_graph::assign(tx, Junction::Menu, tenant_id, permission_id, ids).await?;
    }
    Ok(())
}

/// Deletes the permission with its API, menu and role junction rows.
pub async fn delete(pool: &SqlitePool, id: u32) -> AppResult<()> {
    let permission = find(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("permission {id} does not exist")))?;

    let mut tx = db::begin(pool).await?;
    let result = async {
        permission_graph::clean_for_permission(&mut tx, id).await?;
        role_permission::clean_for_permission(&mut tx, id).await?;
        sqlx::query("DELETE FROM permissions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete permission failed"))?;
        Ok::<_, AppError>(())
    }
    .await;
    db::finish(tx, result).await?;

    tracing::info!(permission_id = id, code = %permission.code, "permission deleted");
    Ok(())
}

// =============================================================================
// PERMISSION GROUPS
// =============================================================================

pub async fn list_groups(pool: &SqlitePool) -> AppResult<Vec<PermissionGroup>> {
    sqlx::query_as::<_, PermissionGroup>(
        "SELECT id, tenant_id, parent_id, path, name, module, created_at FROM permission_groups ORDER BY path, id",
    )
    .fetch_all(pool)
    .await
    .map_err(db_error("list permission groups failed"))
}

async fn find_group(pool: &SqlitePool, id: u32) -> AppResult<Option<PermissionGroup>> {
    sqlx::query_as::<_, PermissionGroup>(
        "SELECT id, tenant_id, parent_id, path, name, module, created_at FROM permission_groups WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(db_error("get permission group failed"))
}

/// Inserts the group and derives its materialized path from the parent's.
pub async fn create_group(pool: &SqlitePool, req: PermissionGroupCreateRequest) -> AppResult<PermissionGroup> {
    if req.name.trim().is_empty() {
        return Err(AppError::bad_request("group name is required"));
    }

    let parent_path = match req.parent_id {
        Some(parent_id) => {
            find_group(pool, parent_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("permission group {parent_id} does not exist")))?
                .path
        }
        None => String::new(),
    };

    let mut tx = db::begin(pool).await?;
    let result = async {
        let result = sqlx::query(
            "INSERT INTO permission_groups (tenant_id, parent_id, path, name, module, created_at) VALUES (?, ?, '', ?, ?, ?)",
        )
        .bind(req.tenant_id.unwrap_or_default())
        .bind(req.parent_id)
        .bind(req.name.as_str())
        .bind(req.module.as_deref())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(db_error("create permission group failed"))?;

        let id = inserted_id(result)?;
        sqlx::query("UPDATE permission_groups SET path = ? WHERE id = ?")
            .bind(group_path(&parent_path, id))
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("set permission group path failed"))?;
        Ok::<_, AppError>(id)
    }
    .await;
    let id = db::finish(tx, result).await?;

    find_group(pool, id)
        .await?
        .ok_or_else(|| AppError::internal("permission group missing after insert"))
}

fn group_path(parent_path: &str, id: u32) -> String {
    let parent = parent_path.trim_end_matches('/');
    format!("{parent}/{id}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_path_extends_parent() {
        assert_eq!(group_path("", 3), "/3/");
        assert_eq!(group_path("/1/", 4), "/1/4/");
        assert_eq!(group_path("/1/4/", 9), "/1/4/9/");
    }
}
