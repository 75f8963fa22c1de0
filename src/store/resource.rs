use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::RwLock;

use super::permission_graph::{self, Junction};
use super::{inserted_id, unique_or_internal};
use crate::db;
use crate::errors::{db_error, AppError, AppResult};
use crate::models::resource::{ApiResource, ApiResourceCreateRequest, DbMenu, Menu, MenuCreateRequest};

const API_COLUMNS: &str = "id, path, method, module, operation, description, scope, status, created_at";

// =============================================================================
// API RESOURCES
// =============================================================================

pub async fn list_apis(pool: &SqlitePool) -> AppResult<Vec<ApiResource>> {
    let sql = format!("SELECT {API_COLUMNS} FROM api_resources ORDER BY path, method");
    sqlx::query_as::<_, ApiResource>(&sql)
        .fetch_all(pool)
        .await
        .map_err(db_error("list api resources failed"))
}

pub async fn get_apis_by_ids(pool: &SqlitePool, ids: &[u32]) -> AppResult<Vec<ApiResource>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {API_COLUMNS} FROM api_resources WHERE id IN ("));
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(") ORDER BY id");

    qb.build_query_as::<ApiResource>()
        .fetch_all(pool)
        .await
        .map_err(db_error("get api resources by ids failed"))
}

pub async fn create_api(pool: &SqlitePool, req: ApiResourceCreateRequest) -> AppResult<ApiResource> {
    if req.path.trim().is_empty() || req.method.trim().is_empty() {
        return Err(AppError::bad_request("api path and method are required"));
    }

    let result = sqlx::query(
        "INSERT INTO api_resources (path, method, module, operation, description, scope, status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, 'ON', ?)",
    )
    .bind(req.path.trim())
    .bind(req.method.trim().to_uppercase())
    .bind(req.module.as_deref())
    .bind(req.operation.as_deref())
    .bind(req.description.as_deref())
    .bind(req.scope.as_deref().unwrap_or("ADMIN"))
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(unique_or_internal("create api resource failed", "api resource already exists"))?;

    let id = inserted_id(result)?;
    get_apis_by_ids(pool, &[id])
        .await?
        .pop()
        .ok_or_else(|| AppError::internal("api resource missing after insert"))
}

/// Deletes the API together with the permission rows pointing at it.
pub async fn delete_api(pool: &SqlitePool, id: u32) -> AppResult<()> {
    let mut tx = db::begin(pool).await?;
    let result = async {
        permission_graph::clean_for_target(&mut tx, Junction::Api, id).await?;
        let deleted = sqlx::query("DELETE FROM api_resources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete api resource failed"))?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::not_found(format!("api resource {id} does not exist")));
        }
        Ok::<_, AppError>(())
    }
    .await;
    db::finish(tx, result).await
}

// =============================================================================
// MENUS
// =============================================================================

pub async fn list_menus(pool: &SqlitePool) -> AppResult<Vec<Menu>> {
    let rows = sqlx::query_as::<_, DbMenu>(
        "SELECT id, parent_id, path, menu_type, status, meta, created_at FROM menus ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .map_err(db_error("list menus failed"))?;

    Ok(rows.into_iter().map(Menu::from).collect())
}

pub async fn create_menu(pool: &SqlitePool, req: MenuCreateRequest) -> AppResult<Menu> {
    let meta = req.meta.as_ref().map(|m| m.to_string());
    let result = sqlx::query(
        "INSERT INTO menus (parent_id, path, menu_type, status, meta, created_at) VALUES (?, ?, ?, 'ON', ?, ?)",
    )
    .bind(req.parent_id)
    .bind(req.path.as_str())
    .bind(req.menu_type.as_deref().unwrap_or("MENU"))
    .bind(meta)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(db_error("create menu failed"))?;

    let id = inserted_id(result)?;
    sqlx::query_as::<_, DbMenu>(
        "SELECT id, parent_id, path, menu_type, status, meta, created_at FROM menus WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(db_error("get menu failed"))?
    .map(Menu::from)
    .ok_or_else(|| AppError::internal("menu missing after insert"))
}

// =============================================================================
// API RESOURCE CACHE
// =============================================================================

type ApiIndex = HashMap<(String, String), ApiResource>;

/// Process-wide lookup of API resources by `(METHOD, path template)`.
///
/// Populated lazily on first lookup and never refreshed on its own; call
/// [`invalidate`](Self::invalidate) to force a reload on the next lookup.
#[derive(Clone, Default)]
pub struct ApiResourceCache {
    inner: Arc<RwLock<Option<ApiIndex>>>,
}

impl ApiResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, pool: &SqlitePool, method: &str, path: &str) -> AppResult<Option<ApiResource>> {
        let key = (method.to_uppercase(), path.to_string());

        {
            let guard = self.inner.read().await;
            if let Some(index) = guard.as_ref() {
                return Ok(index.get(&key).cloned());
            }
        }

        let mut guard = self.inner.write().await;
        if guard.is_none() {
            let apis = list_apis(pool).await?;
            tracing::debug!(count = apis.len(), "api resource cache loaded");
            *guard = Some(
                apis.into_iter()
                    .map(|api| ((api.method.to_uppercase(), api.path.clone()), api))
                    .collect(),
            );
        }

        Ok(guard.as_ref().and_then(|index| index.get(&key).cloned()))
    }

    pub async fn invalidate(&self) {
        *self.inner.write().await = None;
    }

    pub async fn is_loaded(&self) -> bool {
        self.inner.read().await.is_some()
    }
}
