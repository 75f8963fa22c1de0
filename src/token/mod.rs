//! Resolved authorization context carried inside access tokens, and its claim codec.
//!
//! Two decode paths exist: [`payload_from_claims`] reads the typed [`UserTokenClaims`]
//! produced by [`JwtConfig::decode`](crate::jwt::JwtConfig::decode), and
//! [`payload_from_map`] reads a generic JSON object. Both are best-effort per claim: a
//! missing or mis-shaped claim leaves its field unset.

pub mod cache;

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};
use crate::models::role::DataScope;
use crate::models::user::PLATFORM_TENANT_ID;

pub use cache::{TokenCategory, UserTokenCache};

pub const CLAIM_USERNAME: &str = "sub";
pub const CLAIM_USER_ID: &str = "uid";
pub const CLAIM_TENANT_ID: &str = "tid";
pub const CLAIM_CLIENT_ID: &str = "cid";
pub const CLAIM_DEVICE_ID: &str = "did";
pub const CLAIM_ROLE_CODES: &str = "roc";
pub const CLAIM_IS_PLATFORM_ADMIN: &str = "pad";
pub const CLAIM_IS_TENANT_ADMIN: &str = "tad";
pub const CLAIM_DATA_SCOPE: &str = "ds";
pub const CLAIM_ORG_UNIT_ID: &str = "ouid";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserTokenPayload {
    pub user_id: u32,
    pub username: Option<String>,
    pub tenant_id: Option<u32>,
    pub org_unit_id: Option<u32>,
    /// Role codes, not ids.
    #[serde(default)]
    pub roles: Vec<String>,
    pub client_id: Option<String>,
    pub device_id: Option<String>,
    pub data_scope: Option<DataScope>,
    pub is_platform_admin: Option<bool>,
    pub is_tenant_admin: Option<bool>,
}

impl UserTokenPayload {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        username: impl Into<String>,
        user_id: u32,
        tenant_id: u32,
        org_unit_id: Option<u32>,
        roles: Vec<String>,
        data_scope: Option<DataScope>,
        client_id: Option<String>,
        device_id: Option<String>,
        is_platform_admin: bool,
        is_tenant_admin: bool,
    ) -> Self {
        let mut payload = Self {
            user_id,
            username: Some(username.into()),
            tenant_id: Some(tenant_id),
            org_unit_id,
            roles,
            client_id,
            device_id,
            data_scope,
            is_platform_admin: Some(is_platform_admin),
            is_tenant_admin: Some(is_tenant_admin),
        };
        payload.enforce_tenant_admin_invariant();
        payload
    }

    pub fn tenant(&self) -> u32 {
        self.tenant_id.unwrap_or(PLATFORM_TENANT_ID)
    }

    pub fn is_platform_admin(&self) -> bool {
        self.is_platform_admin.unwrap_or(false)
    }

    pub fn is_tenant_admin(&self) -> bool {
        self.is_tenant_admin.unwrap_or(false)
    }

    /// A platform-tenant payload never carries the tenant-admin flag.
    fn enforce_tenant_admin_invariant(&mut self) {
        if self.tenant() == PLATFORM_TENANT_ID && self.is_tenant_admin == Some(true) {
            self.is_tenant_admin = Some(false);
        }
    }
}

/// Flat claim set for signing. Optional fields are only written when present.
pub fn claims_from_payload(payload: &UserTokenPayload) -> Map<String, Value> {
    let mut claims = Map::new();
    claims.insert(CLAIM_USERNAME.into(), Value::from(payload.username.clone().unwrap_or_default()));
    claims.insert(CLAIM_USER_ID.into(), Value::from(payload.user_id));
    claims.insert(CLAIM_TENANT_ID.into(), Value::from(payload.tenant()));

    if !payload.roles.is_empty() {
        claims.insert(CLAIM_ROLE_CODES.into(), Value::from(payload.roles.clone()));
    }
    if let Some(device_id) = &payload.device_id {
        claims.insert(CLAIM_DEVICE_ID.into(), Value::from(device_id.as_str()));
    }
    if let Some(client_id) = &payload.client_id {
        claims.insert(CLAIM_CLIENT_ID.into(), Value::from(client_id.as_str()));
    }
    if let Some(scope) = payload.data_scope {
        claims.insert(CLAIM_DATA_SCOPE.into(), Value::from(scope.as_str()));
    }
    if let Some(org_unit_id) = payload.org_unit_id {
        claims.insert(CLAIM_ORG_UNIT_ID.into(), Value::from(org_unit_id));
    }
    if let Some(flag) = payload.is_platform_admin {
        claims.insert(CLAIM_IS_PLATFORM_ADMIN.into(), Value::from(u8::from(flag)));
    }
    if let Some(flag) = payload.is_tenant_admin {
        let flag = flag && payload.tenant() != PLATFORM_TENANT_ID;
        claims.insert(CLAIM_IS_TENANT_ADMIN.into(), Value::from(u8::from(flag)));
    }

    claims
}

// =============================================================================
// STRUCTURED DECODE
// =============================================================================

/// Typed view of a signed claim set. Every field tolerates a wrong shape by reading as
/// `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserTokenClaims {
    #[serde(default, deserialize_with = "lenient")]
    pub sub: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub uid: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub tid: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub cid: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub did: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub roc: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub pad: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub tad: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ds: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub ouid: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub exp: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub iat: Option<u64>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(err) => {
            tracing::debug!(error = %err, "ignoring malformed claim");
            Ok(None)
        }
    }
}

pub fn payload_from_claims(claims: &UserTokenClaims) -> UserTokenPayload {
    let mut payload = UserTokenPayload {
        user_id: claims.uid.unwrap_or_default(),
        username: claims.sub.clone().filter(|s| !s.is_empty()),
        tenant_id: claims.tid,
        org_unit_id: claims.ouid,
        roles: claims.roc.clone().unwrap_or_default(),
        client_id: claims.cid.clone().filter(|s| !s.is_empty()),
        device_id: claims.did.clone().filter(|s| !s.is_empty()),
        data_scope: claims.ds.as_deref().and_then(|s| s.parse().ok()),
        is_platform_admin: Some(claims.pad.unwrap_or(0) != 0),
        is_tenant_admin: Some(claims.tad.unwrap_or(0) != 0),
    };
    payload.enforce_tenant_admin_invariant();
    payload
}

// =============================================================================
// MAP DECODE
// =============================================================================

fn number_as_u32(value: &Value) -> Option<u32> {
    let number = value.as_f64()?;
    if number.is_finite() && number >= 0.0 && number <= u32::MAX as f64 {
        Some(number as u32)
    } else {
        None
    }
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        other => other.as_f64().map(|n| n != 0.0),
    }
}

/// Decodes a generic claim map. Numbers may arrive as floats. A role-code claim that is
/// not an array is the one structural error.
pub fn payload_from_map(claims: &Map<String, Value>) -> AppResult<UserTokenPayload> {
    let string = |key: &str| {
        claims
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let number = |key: &str| claims.get(key).and_then(number_as_u32);

    let roles = match claims.get(CLAIM_ROLE_CODES) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(_) => return Err(AppError::token("invalid role codes claim")),
    };

    let mut payload = UserTokenPayload {
        user_id: number(CLAIM_USER_ID).unwrap_or_default(),
        username: string(CLAIM_USERNAME),
        tenant_id: number(CLAIM_TENANT_ID),
        org_unit_id: number(CLAIM_ORG_UNIT_ID),
        roles,
        client_id: string(CLAIM_CLIENT_ID),
        device_id: string(CLAIM_DEVICE_ID),
        data_scope: string(CLAIM_DATA_SCOPE).and_then(|s| s.parse().ok()),
        is_platform_admin: claims.get(CLAIM_IS_PLATFORM_ADMIN).and_then(flag),
        is_tenant_admin: claims.get(CLAIM_IS_TENANT_ADMIN).and_then(flag),
    };
    payload.enforce_tenant_admin_invariant();
    Ok(payload)
}
