use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db::Tx;
use crate::errors::{db_error, AppError, AppResult};
use crate::models::user::PLATFORM_TENANT_ID;

/// Removes every permission of `role_id`.
pub async fn clean_for_role(tx: &mut Tx<'_>, role_id: u32) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
        .bind(role_id)
        .execute(&mut **tx)
        .await
        .map_err(db_error("clean role permissions failed"))?;

    Ok(result.rows_affected())
}

/// Roles may only hold permissions of their own tenant or of the platform tenant.
async fn ensure_permissions_visible(tx: &mut Tx<'_>, tenant_id: u32, ids: &[u32]) -> AppResult<()> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id FROM permissions WHERE tenant_id IN (");
    qb.push_bind(tenant_id)
        .push(", ")
        .push_bind(PLATFORM_TENANT_ID)
        .push(") AND id IN (");
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(")");

    let visible: Vec<u32> = qb
        .build_query_scalar::<u32>()
        .fetch_all(&mut **tx)
        .await
        .map_err(db_error("check role permissions failed"))?;

    let foreign: Vec<u32> = ids.iter().copied().filter(|id| !visible.contains(id)).collect();
    if foreign.is_empty() {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "permissions {foreign:?} are not available to tenant {tenant_id}"
        )))
    }
}

/// Replaces the permission set of `role_id` with exactly `permission_ids`. Every id must
/// belong to `tenant_id` or to the platform tenant.
pub async fn assign(
    tx: &mut Tx<'_>,
    tenant_id: u32,
    role_id: u32,
    permission_ids: &[u32],
    operator_id: Option<u32>,
) -> AppResult<()> {
    clean_for_role(tx, role_id).await?;

    let mut ids = permission_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(());
    }
    ensure_permissions_visible(tx, tenant_id, &ids).await?;

    let now = Utc::now();
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO role_permissions (tenant_id, role_id, permission_id, created_by, created_at) ",
    );
    qb.push_values(ids.iter(), |mut b, permission_id| {
        b.push_bind(tenant_id)
            .push_bind(role_id)
            .push_bind(*permission_id)
            .push_bind(operator_id)
            .push_bind(now);
    });

    qb.build()
        .execute(&mut **tx)
        .await
        .map_err(db_error("insert role permissions failed"))?;

    Ok(())
}

pub async fn list_permission_ids(pool: &SqlitePool, role_id: u32) -> AppResult<Vec<u32>> {
    sqlx::query_scalar(
        "SELECT permission_id FROM role_permissions WHERE role_id = ? ORDER BY permission_id",
    )
    .bind(role_id)
    .fetch_all(pool)
    .await
    .map_err(db_error("list role permission ids failed"))
}

/// Union of permission ids over `role_ids`, deduplicated.
pub async fn list_permission_ids_for_roles(
    pool: &SqlitePool,
    role_ids: &[u32],
) -> AppResult<Vec<u32>> {
    if role_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT DISTINCT permission_id FROM role_permissions WHERE role_id IN (");
    let mut sep = qb.separated(", ");
    for id in role_ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(") ORDER BY permission_id");

    qb.build_query_scalar::<u32>()
        .fetch_all(pool)
        .await
        .map_err(db_error("list permission ids for roles failed"))
}

/// Deletes only the listed permissions from the role.
pub async fn remove(pool: &SqlitePool, role_id: u32, permission_ids: &[u32]) -> AppResult<u64> {
    if permission_ids.is_empty() {
        return Ok(0);
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM role_permissions WHERE role_id = ");
    qb.push_bind(role_id).push(" AND permission_id IN (");
    let mut sep = qb.separated(", ");
    for id in permission_ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(")");

    let result = qb
        .build()
        .execute(pool)
        .await
        .map_err(db_error("remove role permissions failed"))?;

    Ok(result.rows_affected())
}

/// Drops junction rows pointing at a deleted permission.
pub async fn clean_for_permission(tx: &mut Tx<'_>, permission_id: u32) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM role_permissions WHERE permission_id = ?")
        .bind(permission_id)
        .execute(&mut **tx)
        .await
        .map_err(db_error("clean permission roles failed"))?;

    Ok(result.rows_affected())
}
