use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::errors::AppError;

/// Code prefix that marks a role as a template.
pub const ROLE_CODE_TEMPLATE_PREFIX: &str = "template:";

// =============================================================================
// DATA SCOPE
// =============================================================================

/// Row-visibility level granted by a role.
///
/// Variants are declared in ascending order, so the derived `Ord` is the merge order
/// `SELF < UNIT_ONLY < UNIT_AND_CHILD < SELECTED_UNITS < ALL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum DataScope {
    #[serde(rename = "SELF")]
    SelfOnly,
    #[serde(rename = "UNIT_ONLY")]
    UnitOnly,
    #[serde(rename = "UNIT_AND_CHILD")]
    UnitAndChild,
    #[serde(rename = "SELECTED_UNITS")]
    SelectedUnits,
    #[serde(rename = "ALL")]
    All,
}

impl DataScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataScope::SelfOnly => "SELF",
            DataScope::UnitOnly => "UNIT_ONLY",
            DataScope::UnitAndChild => "UNIT_AND_CHILD",
            DataScope::SelectedUnits => "SELECTED_UNITS",
            DataScope::All => "ALL",
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            DataScope::SelfOnly => 1,
            DataScope::UnitOnly => 2,
            DataScope::UnitAndChild => 3,
            DataScope::SelectedUnits => 4,
            DataScope::All => 5,
        }
    }
}

impl Default for DataScope {
    fn default() -> Self {
        DataScope::SelfOnly
    }
}

impl fmt::Display for DataScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SELF" => Ok(DataScope::SelfOnly),
            "UNIT_ONLY" => Ok(DataScope::UnitOnly),
            "UNIT_AND_CHILD" => Ok(DataScope::UnitAndChild),
            "SELECTED_UNITS" => Ok(DataScope::SelectedUnits),
            "ALL" => Ok(DataScope::All),
            other => Err(AppError::bad_request(format!("unknown data scope: {other}"))),
        }
    }
}

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchStatus {
    On,
    Off,
}

impl SwitchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchStatus::On => "ON",
            SwitchStatus::Off => "OFF",
        }
    }
}

impl Default for SwitchStatus {
    fn default() -> Self {
        SwitchStatus::On
    }
}

impl FromStr for SwitchStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(SwitchStatus::On),
            "OFF" => Ok(SwitchStatus::Off),
            other => Err(AppError::bad_request(format!("unknown status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: u32,
    pub tenant_id: u32,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: SwitchStatus,
    pub data_scope: DataScope,
    pub is_system: bool,
    pub is_protected: bool,
    pub sort_order: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Permission ids attached through `role_permissions`; filled by the repository on reads.
    #[serde(default)]
    pub permissions: Vec<u32>,
}

impl Role {
    pub fn is_template_code(&self) -> bool {
        self.code.starts_with(ROLE_CODE_TEMPLATE_PREFIX)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: u32,
    pub tenant_id: u32,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub data_scope: String,
    pub is_system: bool,
    pub is_protected: bool,
    pub sort_order: i32,
    pub created_by: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbRole> for Role {
    type Error = AppError;

    fn try_from(db: DbRole) -> Result<Self, Self::Error> {
        Ok(Role {
            id: db.id,
            tenant_id: db.tenant_id,
            code: db.code,
            name: db.name,
            description: db.description,
            status: db.status.parse()?,
            data_scope: db.data_scope.parse()?,
            is_system: db.is_system,
            is_protected: db.is_protected,
            sort_order: db.sort_order,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
            permissions: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    pub tenant_id: Option<u32>,
    #[schema(example = "tenant_admin")]
    pub code: Option<String>,
    #[schema(example = "Tenant administrator")]
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<SwitchStatus>,
    pub data_scope: Option<DataScope>,
    pub is_system: Option<bool>,
    pub is_protected: Option<bool>,
    pub sort_order: Option<i32>,
    /// When present the role's permission set is replaced by exactly these ids.
    pub permissions: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<SwitchStatus>,
    pub data_scope: Option<DataScope>,
    pub is_protected: Option<bool>,
    pub sort_order: Option<i32>,
    pub permissions: Option<Vec<u32>>,
}

// =============================================================================
// ROLE METADATA
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncPolicy {
    Auto,
    Manual,
}

impl SyncPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPolicy::Auto => "AUTO",
            SyncPolicy::Manual => "MANUAL",
        }
    }
}

impl FromStr for SyncPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTO" => Ok(SyncPolicy::Auto),
            "MANUAL" => Ok(SyncPolicy::Manual),
            other => Err(AppError::bad_request(format!("unknown sync policy: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleMetadata {
    pub role_id: u32,
    pub is_template: bool,
    /// Logical role a template seeds, e.g. `tenant_admin`.
    pub template_for: Option<String>,
    pub template_version: i64,
    /// Template a tenant copy was seeded from.
    pub source_template_id: Option<u32>,
    pub last_synced_version: Option<i64>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_policy: SyncPolicy,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRoleMetadata {
    pub role_id: u32,
    pub is_template: bool,
    pub template_for: Option<String>,
    pub template_version: i64,
    pub source_template_id: Option<u32>,
    pub last_synced_version: Option<i64>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_policy: String,
}

impl TryFrom<DbRoleMetadata> for RoleMetadata {
    type Error = AppError;

    fn try_from(db: DbRoleMetadata) -> Result<Self, Self::Error> {
        Ok(RoleMetadata {
            role_id: db.role_id,
            is_template: db.is_template,
            template_for: db.template_for,
            template_version: db.template_version,
            source_template_id: db.source_template_id,
            last_synced_version: db.last_synced_version,
            last_synced_at: db.last_synced_at,
            sync_policy: db.sync_policy.parse()?,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SeedFromTemplateRequest {
    pub tenant_id: u32,
    pub sync_policy: Option<SyncPolicy>,
}
