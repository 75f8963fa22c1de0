use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::{inserted_id, unique_or_internal};
use crate::errors::{db_error, AppError, AppResult};
use crate::models::user::{DbUser, Membership, OrgUnit, Tenant, User, USER_STATUS_NORMAL};

const USER_COLUMNS: &str = "id, tenant_id, username, password_hash, status, created_at";

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
    sqlx::query_as::<_, DbUser>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(db_error("get user by username failed"))
}

pub async fn get(pool: &SqlitePool, id: u32) -> AppResult<User> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    sqlx::query_as::<_, DbUser>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("get user failed"))?
        .map(User::from)
        .ok_or_else(|| AppError::not_found(format!("user {id} does not exist")))
}

/// Stores an already-hashed password.
pub async fn create(pool: &SqlitePool, tenant_id: u32, username: &str, password_hash: &str) -> AppResult<User> {
    let result = sqlx::query(
        "INSERT INTO users (tenant_id, username, password_hash, status, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(tenant_id)
    .bind(username)
    .bind(password_hash)
    .bind(USER_STATUS_NORMAL)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(unique_or_internal("create user failed", "username already in use"))?;

    get(pool, inserted_id(result)?).await
}

pub async fn set_status(pool: &SqlitePool, id: u32, status: &str) -> AppResult<()> {
    sqlx::query("UPDATE users SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .map_err(db_error("set user status failed"))?;
    Ok(())
}

// =============================================================================
// TENANTS
// =============================================================================

pub async fn find_tenant(pool: &SqlitePool, id: u32) -> AppResult<Option<Tenant>> {
    sqlx::query_as::<_, Tenant>("SELECT id, name, status, created_at FROM tenants WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("get tenant failed"))
}

pub async fn create_tenant(pool: &SqlitePool, name: &str, status: &str) -> AppResult<Tenant> {
    let result = sqlx::query("INSERT INTO tenants (name, status, created_at) VALUES (?, ?, ?)")
        .bind(name)
        .bind(status)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(db_error("create tenant failed"))?;

    let id = inserted_id(result)?;
    find_tenant(pool, id)
        .await?
        .ok_or_else(|| AppError::internal("tenant missing after insert"))
}

// =============================================================================
// MEMBERSHIPS
// =============================================================================

pub async fn find_membership(pool: &SqlitePool, user_id: u32, tenant_id: u32) -> AppResult<Option<Membership>> {
    sqlx::query_as::<_, Membership>(
        "SELECT id, user_id, tenant_id, status, created_at FROM memberships WHERE user_id = ? AND tenant_id = ?",
    )
    .bind(user_id)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await
    .map_err(db_error("get membership failed"))
}

/// Returns the existing membership for `(user_id, tenant_id)` or creates one.
pub async fn ensure_membership(pool: &SqlitePool, user_id: u32, tenant_id: u32) -> AppResult<Membership> {
    sqlx::query(
        "INSERT INTO memberships (user_id, tenant_id, status, created_at) VALUES (?, ?, 'ACTIVE', ?) \
         ON CONFLICT (user_id, tenant_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(tenant_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(db_error("create membership failed"))?;

    find_membership(pool, user_id, tenant_id)
        .await?
        .ok_or_else(|| AppError::internal("membership missing after upsert"))
}

// =============================================================================
// ORG UNITS
// =============================================================================

pub async fn create_org_unit(
    pool: &SqlitePool,
    tenant_id: u32,
    parent: Option<&OrgUnit>,
    name: &str,
) -> AppResult<OrgUnit> {
    let result = sqlx::query(
        "INSERT INTO org_units (tenant_id, parent_id, path, name, created_at) VALUES (?, ?, '', ?, ?)",
    )
    .bind(tenant_id)
    .bind(parent.map(|p| p.id))
    .bind(name)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(db_error("create org unit failed"))?;

    let id = inserted_id(result)?;
    let parent_path = parent.map(|p| p.path.trim_end_matches('/')).unwrap_or("");
    sqlx::query("UPDATE org_units SET path = ? WHERE id = ?")
        .bind(format!("{parent_path}/{id}/"))
        .bind(id)
        .execute(pool)
        .await
        .map_err(db_error("set org unit path failed"))?;

    get_org_units_by_ids(pool, &[id])
        .await?
        .pop()
        .ok_or_else(|| AppError::internal("org unit missing after insert"))
}

/// Rows for `ids`, returned in the order of `ids`.
pub async fn get_org_units_by_ids(pool: &SqlitePool, ids: &[u32]) -> AppResult<Vec<OrgUnit>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT id, tenant_id, parent_id, path, name, created_at FROM org_units WHERE id IN (");
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(")");

    let mut rows = qb
        .build_query_as::<OrgUnit>()
        .fetch_all(pool)
        .await
        .map_err(db_error("get org units failed"))?;

    rows.sort_by_key(|unit| ids.iter().position(|id| *id == unit.id));
    Ok(rows)
}
