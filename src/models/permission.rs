use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::models::role::SwitchStatus;

/// Grants access to the admin console at all.
pub const SYSTEM_ACCESS_BACKEND_PERMISSION_CODE: &str = "sys:access_backend";

// =============================================================================
// PERMISSION
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: u32,
    pub tenant_id: u32,
    #[schema(example = "order:export")]
    pub code: String,
    pub name: String,
    pub status: SwitchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub api_ids: Vec<u32>,
    #[serde(default)]
    pub menu_ids: Vec<u32>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPermission {
    pub id: u32,
    pub tenant_id: u32,
    pub code: String,
    pub name: String,
    pub status: String,
    pub group_id: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbPermission> for Permission {
    type Error = AppError;

    fn try_from(db: DbPermission) -> Result<Self, Self::Error> {
        Ok(Permission {
            id: db.id,
            tenant_id: db.tenant_id,
            code: db.code,
            name: db.name,
            status: db.status.parse()?,
            group_id: db.group_id,
            created_at: db.created_at,
            updated_at: db.updated_at,
            api_ids: Vec::new(),
            menu_ids: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PermissionCreateRequest {
    pub tenant_id: Option<u32>,
    #[schema(example = "order:export")]
    pub code: Option<String>,
    #[schema(example = "Export orders")]
    pub name: Option<String>,
    pub status: Option<SwitchStatus>,
    pub group_id: Option<u32>,
    pub api_ids: Option<Vec<u32>>,
    pub menu_ids: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PermissionUpdateRequest {
    pub code: Option<String>,
    pub name: Option<String>,
    pub status: Option<SwitchStatus>,
    pub group_id: Option<u32>,
    pub api_ids: Option<Vec<u32>>,
    pub menu_ids: Option<Vec<u32>>,
}

/// Desired junction set for a permission; the stored set becomes exactly `ids`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignIdsRequest {
    pub ids: Vec<u32>,
}

// =============================================================================
// PERMISSION GROUP
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PermissionGroup {
    pub id: u32,
    pub tenant_id: u32,
    pub parent_id: Option<u32>,
    /// Materialized path such as `/1/4/`.
    pub path: String,
    pub name: String,
    pub module: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PermissionGroupCreateRequest {
    pub tenant_id: Option<u32>,
    pub parent_id: Option<u32>,
    pub name: String,
    pub module: Option<String>,
}
