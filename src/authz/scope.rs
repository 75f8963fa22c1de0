//! Pure helpers that turn a user's roles and org units into data scope and admin tiers.

use crate::models::role::{DataScope, Role};
use crate::models::user::{OrgUnit, PLATFORM_TENANT_ID};

const PLATFORM_ADMIN_CODES: [&str; 3] = ["super", "super_admin", "superadmin"];
const TENANT_ADMIN_CODES: [&str; 3] = ["tenant_admin", "tenantadmin", "tenant-admin"];

/// Widest scope among `scopes`; `SELF` when empty.
pub fn merge_scopes<I>(scopes: I) -> DataScope
where
    I: IntoIterator<Item = DataScope>,
{
    let mut merged = DataScope::SelfOnly;
    for scope in scopes {
        if scope == DataScope::All {
            return DataScope::All;
        }
        if scope.priority() > merged.priority() {
            merged = scope;
        }
    }
    merged
}

pub fn merge_data_scope(roles: &[Role]) -> DataScope {
    merge_scopes(roles.iter().map(|role| role.data_scope))
}

fn code_in(code: &str, allow_list: &[&str]) -> bool {
    allow_list.iter().any(|candidate| candidate.eq_ignore_ascii_case(code))
}

/// Platform tenant only: a system role with `ALL` scope, or a super-admin code.
pub fn is_platform_admin(tenant_id: u32, roles: &[Role]) -> bool {
    if tenant_id != PLATFORM_TENANT_ID {
        return false;
    }

    roles.iter().any(|role| {
        (role.data_scope == DataScope::All && role.is_system) || code_in(&role.code, &PLATFORM_ADMIN_CODES)
    })
}

/// Non-platform tenants only: an `ALL` or `UNIT_AND_CHILD` role, or a tenant-admin code.
pub fn has_tenant_admin_role(tenant_id: u32, roles: &[Role]) -> bool {
    if tenant_id == PLATFORM_TENANT_ID {
        return false;
    }

    roles.iter().any(|role| {
        matches!(role.data_scope, DataScope::All | DataScope::UnitAndChild)
            || code_in(&role.code, &TENANT_ADMIN_CODES)
    })
}

fn path_depth(path: &str) -> usize {
    path.trim()
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .count()
}

/// Org unit with the deepest materialized path; the first one wins a tie.
pub fn pick_most_specific_org_unit(units: &[OrgUnit]) -> Option<u32> {
    let mut best: Option<(&OrgUnit, usize)> = None;
    for unit in units {
        let depth = path_depth(&unit.path);
        if best.map_or(true, |(_, best_depth)| depth > best_depth) {
            best = Some((unit, depth));
        }
    }
    best.map(|(unit, _)| unit.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::SwitchStatus;
    use chrono::Utc;

    fn role(code: &str, scope: DataScope, is_system: bool) -> Role {
        Role {
            id: 1,
            tenant_id: 0,
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            status: SwitchStatus::On,
            data_scope: scope,
            is_system,
            is_protected: false,
            sort_order: 0,
            created_by: None,
            created_at: Utc::now(),
            updated_at: None,
            permissions: Vec::new(),
        }
    }

    fn unit(id: u32, path: &str) -> OrgUnit {
        OrgUnit {
            id,
            tenant_id: 5,
            parent_id: None,
            path: path.to_string(),
            name: format!("unit-{id}"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_roles_merge_to_self() {
        assert_eq!(merge_data_scope(&[]), DataScope::SelfOnly);
    }

    #[test]
    fn merge_keeps_widest_scope() {
        let roles = vec![
            role("a", DataScope::UnitOnly, false),
            role("b", DataScope::SelectedUnits, false),
            role("c", DataScope::SelfOnly, false),
        ];
        assert_eq!(merge_data_scope(&roles), DataScope::SelectedUnits);
    }

    #[test]
    fn merge_never_shrinks_when_a_role_is_added() {
        let all = [
            DataScope::SelfOnly,
            DataScope::UnitOnly,
            DataScope::UnitAndChild,
            DataScope::SelectedUnits,
            DataScope::All,
        ];
        for a in all {
            for b in all {
                for c in all {
                    let full = merge_scopes([a, b, c]);
                    assert!(full >= merge_scopes([a, b]));
                    assert!(full >= merge_scopes([b, c]));
                    assert!(full >= merge_scopes([a, c]));
                }
            }
        }
    }

    #[test]
    fn platform_admin_requires_platform_tenant() {
        let roles = vec![role("Super_Admin", DataScope::SelfOnly, false)];
        assert!(is_platform_admin(0, &roles));
        assert!(!is_platform_admin(5, &roles));

        let system_all = vec![role("ops", DataScope::All, true)];
        assert!(is_platform_admin(0, &system_all));

        let plain_all = vec![role("ops", DataScope::All, false)];
        assert!(!is_platform_admin(0, &plain_all));
    }

    #[test]
    fn tenant_admin_by_scope_or_code() {
        let r1 = role("r1", DataScope::UnitAndChild, false);
        let r2 = role("r2", DataScope::SelfOnly, false);
        assert!(has_tenant_admin_role(5, &[r1.clone(), r2.clone()]));
        assert!(!has_tenant_admin_role(5, &[r2.clone()]));
        assert!(has_tenant_admin_role(5, &[role("Tenant-Admin", DataScope::SelfOnly, false)]));
        assert!(!has_tenant_admin_role(0, &[r1]));
    }

    #[test]
    fn deepest_org_unit_wins_and_ties_keep_first() {
        let units = vec![unit(1, "/1/"), unit(7, "/1/7/"), unit(9, "/1/9/"), unit(3, "/3/")];
        assert_eq!(pick_most_specific_org_unit(&units), Some(7));
        assert_eq!(pick_most_specific_org_unit(&[]), None);
        assert_eq!(pick_most_specific_org_unit(&[unit(4, "  /2/4/ ")]), Some(4));
    }
}
