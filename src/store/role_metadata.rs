//! Role templates: marking, seeding tenant copies, and version-driven sync of copies.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::SqlitePool;

use super::{role, role_permission};
use crate::db::{self, Tx};
use crate::errors::{db_error, AppError, AppResult};
use crate::models::role::{
    DbRoleMetadata, Role, RoleCreateRequest, RoleMetadata, SyncPolicy, ROLE_CODE_TEMPLATE_PREFIX,
};

const METADATA_COLUMNS: &str = "role_id, is_template, template_for, template_version, source_template_id, \
     last_synced_version, last_synced_at, sync_policy";

pub async fn get(pool: &SqlitePool, role_id: u32) -> AppResult<Option<RoleMetadata>> {
    let sql = format!("SELECT {METADATA_COLUMNS} FROM role_metadata WHERE role_id = ?");
    let row = sqlx::query_as::<_, DbRoleMetadata>(&sql)
        .bind(role_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("get role metadata failed"))?;

    row.map(RoleMetadata::try_from).transpose()
}

pub async fn upsert(tx: &mut Tx<'_>, meta: &RoleMetadata) -> AppResult<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO role_metadata (role_id, is_template, template_for, template_version, source_template_id, \
         last_synced_version, last_synced_at, sync_policy, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (role_id) DO UPDATE SET is_template = excluded.is_template, template_for = excluded.template_for, \
         template_version = excluded.template_version, source_template_id = excluded.source_template_id, \
         last_synced_version = excluded.last_synced_version, last_synced_at = excluded.last_synced_at, \
         sync_policy = excluded.sync_policy, updated_at = excluded.updated_at",
    )
    .bind(meta.role_id)
    .bind(meta.is_template)
    .bind(meta.template_for.as_deref())
    .bind(meta.template_version)
    .bind(meta.source_template_id)
    .bind(meta.last_synced_version)
    .bind(meta.last_synced_at)
    .bind(meta.sync_policy.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(db_error("upsert role metadata failed"))?;

    Ok(())
}

pub async fn delete(tx: &mut Tx<'_>, role_id: u32) -> AppResult<()> {
    sqlx::query("DELETE FROM role_metadata WHERE role_id = ?")
        .bind(role_id)
        .execute(&mut **tx)
        .await
        .map_err(db_error("delete role metadata failed"))?;
    Ok(())
}

/// Marks a freshly created role as a template for the role code it seeds.
pub async fn mark_template(tx: &mut Tx<'_>, role_id: u32, template_for: &str) -> AppResult<()> {
    let meta = RoleMetadata {
        role_id,
        is_template: true,
        template_for: Some(template_for.to_string()),
        template_version: 1,
        source_template_id: None,
        last_synced_version: None,
        last_synced_at: None,
        sync_policy: SyncPolicy::Manual,
    };
    upsert(tx, &meta).await
}

pub async fn is_template(pool: &SqlitePool, role_id: u32) -> AppResult<bool> {
    Ok(get(pool, role_id).await?.is_some_and(|m| m.is_template))
}

/// Ids of every role flagged as a template in its metadata.
pub async fn template_role_ids(pool: &SqlitePool) -> AppResult<HashSet<u32>> {
    let ids: Vec<u32> = sqlx::query_scalar("SELECT role_id FROM role_metadata WHERE is_template = 1")
        .fetch_all(pool)
        .await
        .map_err(db_error("list template roles failed"))?;

    Ok(ids.into_iter().collect())
}

/// Bumps the template version and returns the new value.
pub async fn upgrade_template_version(tx: &mut Tx<'_>, role_id: u32) -> AppResult<i64> {
    sqlx::query_scalar(
        "UPDATE role_metadata SET template_version = template_version + 1, updated_at = ? \
         WHERE role_id = ? AND is_template = 1 RETURNING template_version",
    )
    .bind(Utc::now())
    .bind(role_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error("upgrade template version failed"))?
    .ok_or_else(|| AppError::not_found(format!("role {role_id} is not a template")))
}

async fn list_copies(pool: &SqlitePool, template_id: u32) -> AppResult<Vec<RoleMetadata>> {
    let sql = format!("SELECT {METADATA_COLUMNS} FROM role_metadata WHERE source_template_id = ? ORDER BY role_id");
    let rows = sqlx::query_as::<_, DbRoleMetadata>(&sql)
        .bind(template_id)
        .fetch_all(pool)
        .await
        .map_err(db_error("list template copies failed"))?;

    rows.into_iter().map(RoleMetadata::try_from).collect()
}

fn strip_template_prefix(code: &str) -> &str {
    code.strip_prefix(ROLE_CODE_TEMPLATE_PREFIX).unwrap_or(code)
}

async fn require_template(pool: &SqlitePool, template_id: u32) -> AppResult<(Role, RoleMetadata)> {
    let template = role::get(pool, template_id).await?;
    let meta = get(pool, template_id).await?;

    match meta {
        Some(meta) if meta.is_template => Ok((template, meta)),
        _ if template.is_template_code() => {
            // prefix-only templates get metadata on first use
            let mut tx = db::begin(pool).await?;
            let code = strip_template_prefix(&template.code).to_string();
            let result = mark_template(&mut tx, template_id, &code).await;
            db::finish(tx, result).await?;
            let meta = get(pool, template_id)
                .await?
                .ok_or_else(|| AppError::internal("template metadata missing after upsert"))?;
            Ok((template, meta))
        }
        _ => Err(AppError::bad_request(format!("role {template_id} is not a template"))),
    }
}

/// Copies a template into `tenant_id`: code without the template prefix, name, data
/// scope and permission set. The copy records which template version it mirrors.
pub async fn seed_from_template(
    pool: &SqlitePool,
    template_id: u32,
    tenant_id: u32,
    sync_policy: Option<SyncPolicy>,
    operator_id: Option<u32>,
) -> AppResult<Role> {
    let (template, meta) = require_template(pool, template_id).await?;
    let code = meta
        .template_for
        .clone()
        .unwrap_or_else(|| strip_template_prefix(&template.code).to_string());

    let req = RoleCreateRequest {
        tenant_id: Some(tenant_id),
        code: Some(code),
        name: Some(template.name.clone()),
        description: template.description.clone(),
        status: Some(template.status),
        data_scope: Some(template.data_scope),
        is_system: Some(template.is_system),
        is_protected: Some(true),
        sort_order: Some(template.sort_order),
        permissions: Some(template.permissions.clone()),
    };

    let mut tx = db::begin(pool).await?;
    let result = async {
        let role_id = role::create_in_tx(&mut tx, req, operator_id).await?;
        let copy = RoleMetadata {
            role_id,
            is_template: false,
            template_for: meta.template_for.clone(),
            template_version: meta.template_version,
            source_template_id: Some(template_id),
            last_synced_version: Some(meta.template_version),
            last_synced_at: Some(Utc::now()),
            sync_policy: sync_policy.unwrap_or(SyncPolicy::Auto),
        };
        upsert(&mut tx, &copy).await?;
        Ok::<_, AppError>(role_id)
    }
    .await;
    let role_id = db::finish(tx, result).await?;

    tracing::info!(template_id, tenant_id, role_id, "tenant role seeded from template");
    role::get(pool, role_id).await
}

/// Bumps the template version and refreshes every `AUTO` copy. Returns how many copies
/// were synced; `MANUAL` copies are skipped.
pub async fn sync_copies(pool: &SqlitePool, template_id: u32, operator_id: Option<u32>) -> AppResult<usize> {
    let (template, _) = require_template(pool, template_id).await?;
    let copies = list_copies(pool, template_id).await?;

    let mut tx = db::begin(pool).await?;
    let result = async {
        let version = upgrade_template_version(&mut tx, template_id).await?;
        let now = Utc::now();
        let mut synced = 0;

        for mut copy in copies {
            if copy.sync_policy != SyncPolicy::Auto {
                continue;
            }
            let Some(tenant_id) = tenant_of(&mut tx, copy.role_id).await? else {
                continue;
            };

            role_permission::assign(&mut tx, tenant_id, copy.role_id, &template.permissions, operator_id).await?;
            sqlx::query("UPDATE roles SET data_scope = ?, updated_by = ?, updated_at = ? WHERE id = ?")
                .bind(template.data_scope.as_str())
                .bind(operator_id)
                .bind(now)
                .bind(copy.role_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("sync template copy failed"))?;

            copy.template_version = version;
            copy.last_synced_version = Some(version);
            copy.last_synced_at = Some(now);
            upsert(&mut tx, &copy).await?;
            synced += 1;
        }

        Ok::<_, AppError>(synced)
    }
    .await;

    let synced = db::finish(tx, result).await?;
    tracing::info!(template_id, synced, "template copies synced");
    Ok(synced)
}

async fn tenant_of(tx: &mut Tx<'_>, role_id: u32) -> AppResult<Option<u32>> {
    sqlx::query_scalar("SELECT tenant_id FROM roles WHERE id = ?")
        .bind(role_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error("get role tenant failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_prefix_is_stripped_once() {
        assert_eq!(strip_template_prefix("template:tenant_admin"), "tenant_admin");
        assert_eq!(strip_template_prefix("tenant_admin"), "tenant_admin");
    }
}
