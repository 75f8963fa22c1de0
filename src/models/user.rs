use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::token::UserTokenPayload;

/// Tenant id of the platform (cross-tenant) scope.
pub const PLATFORM_TENANT_ID: u32 = 0;

pub const USER_STATUS_NORMAL: &str = "NORMAL";
pub const TENANT_STATUS_ON: &str = "ON";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: u32,
    pub tenant_id: u32,
    pub username: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: u32,
    pub tenant_id: u32,
    pub username: String,
    pub password_hash: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<DbUser> for User {
    fn from(value: DbUser) -> Self {
        User {
            id: value.id,
            tenant_id: value.tenant_id,
            username: value.username,
            status: value.status,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Tenant {
    pub id: u32,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OrgUnit {
    pub id: u32,
    pub tenant_id: u32,
    pub parent_id: Option<u32>,
    /// Materialized path, e.g. `/1/7/12/`.
    pub path: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Membership {
    pub id: u32,
    pub user_id: u32,
    pub tenant_id: u32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    #[default]
    Password,
    RefreshToken,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub grant_type: GrantType,
    #[schema(example = "admin")]
    pub username: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub refresh_expires_in: u64,
    pub payload: UserTokenPayload,
}
