//! Login-time resolution of a user's roles into the authority frozen into the token.

use sqlx::SqlitePool;

use super::scope::{has_tenant_admin_role, is_platform_admin, merge_data_scope, pick_most_specific_org_unit};
use crate::errors::{AppError, AppResult};
use crate::models::assignment::{RelationKind, SubjectKind};
use crate::models::role::{DataScope, Role, SwitchStatus};
use crate::models::user::{OrgUnit, PLATFORM_TENANT_ID};
use crate::store::{role, role_metadata, user, AssignmentStore};
use crate::token::UserTokenPayload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuthority {
    pub role_codes: Vec<String>,
    pub data_scope: DataScope,
    pub org_unit_id: Option<u32>,
    pub is_platform_admin: bool,
    pub is_tenant_admin: bool,
}

impl ResolvedAuthority {
    /// Copies the authority into a token payload.
    pub fn apply(&self, payload: &mut UserTokenPayload) {
        payload.roles = self.role_codes.clone();
        payload.data_scope = Some(self.data_scope);
        payload.org_unit_id = self.org_unit_id;
        payload.is_platform_admin = Some(self.is_platform_admin);
        payload.is_tenant_admin = Some(self.is_tenant_admin && payload.tenant() != PLATFORM_TENANT_ID);
    }
}

/// Merges scope, detects admin tiers and picks the org unit from already-loaded rows.
pub fn evaluate(tenant_id: u32, roles: &[Role], org_units: &[OrgUnit]) -> ResolvedAuthority {
    ResolvedAuthority {
        role_codes: roles.iter().map(|role| role.code.clone()).collect(),
        data_scope: merge_data_scope(roles),
        org_unit_id: pick_most_specific_org_unit(org_units),
        is_platform_admin: is_platform_admin(tenant_id, roles),
        is_tenant_admin: has_tenant_admin_role(tenant_id, roles),
    }
}

/// Admin console sessions need an admin tier and a scope wider than `SELF`.
pub fn check_authority_gate(authority: &ResolvedAuthority) -> AppResult<()> {
    if !(authority.is_platform_admin || authority.is_tenant_admin) {
        return Err(AppError::forbidden("user has no administrative role"));
    }
    if authority.data_scope == DataScope::SelfOnly {
        return Err(AppError::forbidden("data scope is insufficient for the admin console"));
    }
    Ok(())
}

/// Active ids from the user's direct assignments plus its membership in the tenant.
async fn active_target_ids(
    pool: &SqlitePool,
    direct: AssignmentStore,
    via_membership: AssignmentStore,
    user_id: u32,
    membership_id: Option<u32>,
    tenant_id: u32,
) -> AppResult<Vec<u32>> {
    let mut ids = direct.list_active_ids_in_tenant(pool, user_id, tenant_id).await?;
    if let Some(membership_id) = membership_id {
        for id in via_membership
            .list_active_ids_in_tenant(pool, membership_id, tenant_id)
            .await?
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

/// Loads the user's active roles and org units in `tenant_id` and applies the
/// authority gate. Disabled and template roles are ignored, as are targets owned by
/// another tenant.
pub async fn resolve(pool: &SqlitePool, user_id: u32, tenant_id: u32) -> AppResult<ResolvedAuthority> {
    let membership_id = user::find_membership(pool, user_id, tenant_id)
        .await?
        .map(|membership| membership.id);

    let role_ids = active_target_ids(
        pool,
        AssignmentStore::user_roles(),
        AssignmentStore::new(SubjectKind::Membership, RelationKind::Role),
        user_id,
        membership_id,
        tenant_id,
    )
    .await?;
    let org_unit_ids = active_target_ids(
        pool,
        AssignmentStore::user_org_units(),
        AssignmentStore::new(SubjectKind::Membership, RelationKind::OrgUnit),
        user_id,
        membership_id,
        tenant_id,
    )
    .await?;

    let templates = role_metadata::template_role_ids(pool).await?;
    let roles: Vec<Role> = role::get_by_ids(pool, &role_ids)
        .await?
        .into_iter()
        .filter(|role| role.tenant_id == tenant_id && role.status == SwitchStatus::On)
        .filter(|role| !role.is_template_code() && !templates.contains(&role.id))
        .collect();
    let org_units: Vec<OrgUnit> = user::get_org_units_by_ids(pool, &org_unit_ids)
        .await?
        .into_iter()
        .filter(|unit| unit.tenant_id == tenant_id)
        .collect();

    let authority = evaluate(tenant_id, &roles, &org_units);
    tracing::debug!(
        user_id,
        tenant_id,
        roles = ?authority.role_codes,
        data_scope = %authority.data_scope,
        platform_admin = authority.is_platform_admin,
        tenant_admin = authority.is_tenant_admin,
        "authority resolved"
    );

    check_authority_gate(&authority)?;
    Ok(authority)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority(scope: DataScope, platform: bool, tenant: bool) -> ResolvedAuthority {
        ResolvedAuthority {
            role_codes: vec!["r".into()],
            data_scope: scope,
            org_unit_id: None,
            is_platform_admin: platform,
            is_tenant_admin: tenant,
        }
    }

    #[test]
    fn gate_rejects_plain_users_and_self_scope() {
        assert!(check_authority_gate(&authority(DataScope::All, false, false)).is_err());
        assert!(check_authority_gate(&authority(DataScope::SelfOnly, false, true)).is_err());
        assert!(check_authority_gate(&authority(DataScope::UnitAndChild, false, true)).is_ok());
        assert!(check_authority_gate(&authority(DataScope::All, true, false)).is_ok());
    }

    #[test]
    fn apply_never_marks_platform_tenant_as_tenant_admin() {
        let mut payload = UserTokenPayload {
            tenant_id: Some(0),
            ..Default::default()
        };
        authority(DataScope::All, true, true).apply(&mut payload);
        assert_eq!(payload.is_tenant_admin, Some(false));
        assert_eq!(payload.data_scope, Some(DataScope::All));
    }
}
