//! Fan-out from a permission to the API resources and menus it unlocks.
//!
//! Assigning is a full replace: rows whose target is outside the desired set are
//! deleted, the rest are upserted. Afterwards the junction holds exactly the desired set.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db::{self, Tx};
use crate::errors::{db_error, AppResult};

pub use super::role_permission::list_permission_ids_for_roles;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Junction {
    Api,
    Menu,
}

impl Junction {
    fn table(&self) -> &'static str {
        match self {
            Junction::Api => "permission_apis",
            Junction::Menu => "permission_menus",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Junction::Api => "api_id",
            Junction::Menu => "menu_id",
        }
    }
}

pub async fn list_api_ids_for_permissions(
    pool: &SqlitePool,
    permission_ids: &[u32],
) -> AppResult<Vec<u32>> {
    list_target_ids(pool, Junction::Api, permission_ids).await
}

pub async fn list_menu_ids_for_permissions(
    pool: &SqlitePool,
    permission_ids: &[u32],
) -> AppResult<Vec<u32>> {
    list_target_ids(pool, Junction::Menu, permission_ids).await
}

async fn list_target_ids(
    pool: &SqlitePool,
    junction: Junction,
    permission_ids: &[u32],
) -> AppResult<Vec<u32>> {
    if permission_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT DISTINCT {} FROM {} WHERE permission_id IN (",
        junction.column(),
        junction.table()
    ));
    let mut sep = qb.separated(", ");
    for id in permission_ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(format!(") ORDER BY {}", junction.column()));

    qb.build_query_scalar::<u32>()
        .fetch_all(pool)
        .await
        .map_err(db_error("list permission junction ids failed"))
}

/// Deletes the permission's rows whose target is not in `keep_ids`, or that belong to
/// another tenant. An empty `keep_ids` clears the permission.
pub async fn clean_not_exist(
    tx: &mut Tx<'_>,
    junction: Junction,
    tenant_id: u32,
    permission_id: u32,
    keep_ids: &[u32],
) -> AppResult<u64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "DELETE FROM {} WHERE permission_id = ",
        junction.table()
    ));
    qb.push_bind(permission_id);

    if !keep_ids.is_empty() {
        qb.push(" AND (tenant_id <> ")
            .push_bind(tenant_id)
            .push(format!(" OR {} NOT IN (", junction.column()));
        let mut sep = qb.separated(", ");
        for id in keep_ids {
            sep.push_bind(*id);
        }
        sep.push_unseparated("))");
    }

    let result = qb
        .build()
        .execute(&mut **tx)
        .await
        .map_err(db_error("clean stale permission junction rows failed"))?;

    Ok(result.rows_affected())
}

/// Makes the permission's `junction` rows exactly `ids`. Re-running with the same set
/// is a no-op apart from `updated_at`.
pub async fn assign(
    tx: &mut Tx<'_>,
    junction: Junction,
    tenant_id: u32,
    permission_id: u32,
    ids: &[u32],
) -> AppResult<()> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    clean_not_exist(tx, junction, tenant_id, permission_id, &ids).await?;

    if ids.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "INSERT INTO {} (tenant_id, permission_id, {}, created_at, updated_at) ",
        junction.table(),
        junction.column()
    ));
    qb.push_values(ids.iter(), |mut b, id| {
        b.push_bind(tenant_id)
            .push_bind(permission_id)
            .push_bind(*id)
            .push_bind(now)
            .push_bind(now);
    });
    qb.push(format!(
        " ON CONFLICT (tenant_id, permission_id, {}) DO UPDATE SET updated_at = excluded.updated_at",
        junction.column()
    ));

    qb.build()
        .execute(&mut **tx)
        .await
        .map_err(db_error("upsert permission junction rows failed"))?;

    Ok(())
}

pub async fn assign_apis_to_permission(
    pool: &SqlitePool,
    tenant_id: u32,
    permission_id: u32,
    api_ids: &[u32],
) -> AppResult<()> {
    let mut tx = db::begin(pool).await?;
    let result = assign(&mut tx, Junction::Api, tenant_id, permission_id, api_ids).await;
    db::finish(tx, result).await
}

pub async fn assign_menus_to_permission(
    pool: &SqlitePool,
    tenant_id: u32,
    permission_id: u32,
    menu_ids: &[u32],
) -> AppResult<()> {
    let mut tx = db::begin(pool).await?;
    let result = assign(&mut tx, Junction::Menu, tenant_id, permission_id, menu_ids).await;
    db::finish(tx, result).await
}

/// Removes both API and menu rows of a permission.
pub async fn clean_for_permission(tx: &mut Tx<'_>, permission_id: u32) -> AppResult<()> {
    for junction in [Junction::Api, Junction::Menu] {
        let sql = format!("DELETE FROM {} WHERE permission_id = ?", junction.table());
        sqlx::query(&sql)
            .bind(permission_id)
            .execute(&mut **tx)
            .await
            .map_err(db_error("clean permission junction rows failed"))?;
    }
    Ok(())
}

/// Removes rows pointing at a deleted API resource or menu.
pub async fn clean_for_target(tx: &mut Tx<'_>, junction: Junction, target_id: u32) -> AppResult<u64> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        junction.table(),
        junction.column()
    );
    let result = sqlx::query(&sql)
        .bind(target_id)
        .execute(&mut **tx)
        .await
        .map_err(db_error("clean junction rows for target failed"))?;

    Ok(result.rows_affected())
}

pub async fn count_for_permission(
    pool: &SqlitePool,
    junction: Junction,
    permission_id: u32,
) -> AppResult<i64> {
    let sql = format!(
        "SELECT COUNT(1) FROM {} WHERE permission_id = ?",
        junction.table()
    );
    sqlx::query_scalar(&sql)
        .bind(permission_id)
        .fetch_one(pool)
        .await
        .map_err(db_error("count permission junction rows failed"))
}
