use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;

// =============================================================================
// API RESOURCE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ApiResource {
    pub id: u32,
    /// Route template, e.g. `/admin/v1/roles/{id}`.
    pub path: String,
    pub method: String,
    pub module: Option<String>,
    pub operation: Option<String>,
    pub description: Option<String>,
    /// ADMIN, TENANT, ...
    pub scope: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ApiResourceCreateRequest {
    #[schema(example = "/admin/v1/orders/export")]
    pub path: String,
    #[schema(example = "POST")]
    pub method: String,
    pub module: Option<String>,
    pub operation: Option<String>,
    pub description: Option<String>,
    pub scope: Option<String>,
}

// =============================================================================
// MENU
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Menu {
    pub id: u32,
    pub parent_id: Option<u32>,
    pub path: String,
    /// CATALOG, MENU, EMBEDDED, LINK or BUTTON.
    pub menu_type: String,
    pub status: String,
    /// UI metadata, including the authority codes a button requires.
    #[schema(value_type = Object)]
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbMenu {
    pub id: u32,
    pub parent_id: Option<u32>,
    pub path: String,
    pub menu_type: String,
    pub status: String,
    pub meta: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbMenu> for Menu {
    fn from(db: DbMenu) -> Self {
        Menu {
            id: db.id,
            parent_id: db.parent_id,
            path: db.path,
            menu_type: db.menu_type,
            status: db.status,
            meta: db.meta.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MenuCreateRequest {
    pub parent_id: Option<u32>,
    pub path: String,
    pub menu_type: Option<String>,
    #[schema(value_type = Object)]
    pub meta: Option<Value>,
}
