mod common;

use anyhow::Result;
use chrono::{Duration, Utc};

use tenant_authz::authz::resolver;
use tenant_authz::errors::AppError;
use tenant_authz::models::assignment::{AssignmentInput, RelationKind, SubjectKind};
use tenant_authz::models::role::{DataScope, RoleUpdateRequest, SwitchStatus};
use tenant_authz::store::{role, user, AssignmentStore};

use common::{assign_roles, create_role, create_user, setup_pool};

#[tokio::test]
async fn roles_merge_to_the_widest_scope() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let alice = create_user(&pool, 5, "alice").await?;
    let unit = create_role(&pool, 5, "unit_lead", DataScope::UnitOnly).await?;
    let division = create_role(&pool, 5, "division_lead", DataScope::UnitAndChild).await?;
    assign_roles(&pool, alice.id, 5, &[unit.id, division.id]).await?;

    let authority = resolver::resolve(&pool, alice.id, 5).await?;

    assert_eq!(authority.data_scope, DataScope::UnitAndChild);
    assert_eq!(authority.role_codes, vec!["unit_lead", "division_lead"]);
    assert!(authority.is_tenant_admin);
    assert!(!authority.is_platform_admin);
    Ok(())
}

#[tokio::test]
async fn self_scope_users_are_refused() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let bob = create_user(&pool, 5, "bob").await?;
    let member = create_role(&pool, 5, "member", DataScope::SelfOnly).await?;
    assign_roles(&pool, bob.id, 5, &[member.id]).await?;

    let err = resolver::resolve(&pool, bob.id, 5).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    Ok(())
}

#[tokio::test]
async fn tenant_admin_code_still_needs_a_wide_scope() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let carol = create_user(&pool, 5, "carol").await?;
    let admin = create_role(&pool, 5, "tenant_admin", DataScope::SelfOnly).await?;
    assign_roles(&pool, carol.id, 5, &[admin.id]).await?;

    assert!(resolver::resolve(&pool, carol.id, 5).await.is_err());

    let selected = create_role(&pool, 5, "regional", DataScope::SelectedUnits).await?;
    assign_roles(&pool, carol.id, 5, &[admin.id, selected.id]).await?;

    let authority = resolver::resolve(&pool, carol.id, 5).await?;
    assert!(authority.is_tenant_admin);
    assert_eq!(authority.data_scope, DataScope::SelectedUnits);
    Ok(())
}

#[tokio::test]
async fn platform_admin_is_detected_only_in_the_platform_tenant() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let root = create_user(&pool, 0, "root").await?;
    let platform = create_role(&pool, 0, "super_admin", DataScope::All).await?;
    assign_roles(&pool, root.id, 0, &[platform.id]).await?;

    let authority = resolver::resolve(&pool, root.id, 0).await?;
    assert!(authority.is_platform_admin);
    assert!(!authority.is_tenant_admin);
    assert_eq!(authority.data_scope, DataScope::All);
    Ok(())
}

#[tokio::test]
async fn disabled_and_expired_roles_are_ignored() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let dave = create_user(&pool, 5, "dave").await?;
    let everything = create_role(&pool, 5, "everything", DataScope::All).await?;
    let expired = create_role(&pool, 5, "former_lead", DataScope::UnitAndChild).await?;
    let member = create_role(&pool, 5, "member", DataScope::UnitOnly).await?;

    role::update(
        &pool,
        everything.id,
        RoleUpdateRequest {
            status: Some(SwitchStatus::Off),
            ..Default::default()
        },
        None,
    )
    .await?;

    let rows = vec![
        AssignmentInput::target(everything.id),
        AssignmentInput {
            target_id: expired.id,
            end_at: Some(Utc::now() - Duration::hours(1)),
            ..Default::default()
        },
        AssignmentInput::target(member.id),
    ];
    AssignmentStore::user_roles().replace(&pool, dave.id, 5, &rows, None).await?;

    // only `member` survives, and UNIT_ONLY without an admin code fails the gate
    let err = resolver::resolve(&pool, dave.id, 5).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    Ok(())
}

#[tokio::test]
async fn membership_roles_and_org_units_are_merged() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let erin = create_user(&pool, 0, "erin").await?;
    let membership = user::ensure_membership(&pool, erin.id, 5).await?;

    let lead = create_role(&pool, 5, "division_lead", DataScope::UnitAndChild).await?;
    AssignmentStore::new(SubjectKind::Membership, RelationKind::Role)
        .replace(&pool, membership.id, 5, &[AssignmentInput::target(lead.id)], None)
        .await?;

    let hq = user::create_org_unit(&pool, 5, None, "HQ").await?;
    let sales = user::create_org_unit(&pool, 5, Some(&hq), "Sales").await?;
    AssignmentStore::user_org_units()
        .replace(&pool, erin.id, 5, &[AssignmentInput::target(hq.id)], None)
        .await?;
    AssignmentStore::new(SubjectKind::Membership, RelationKind::OrgUnit)
        .replace(&pool, membership.id, 5, &[AssignmentInput::target(sales.id)], None)
        .await?;

    let authority = resolver::resolve(&pool, erin.id, 5).await?;

    assert_eq!(authority.role_codes, vec!["division_lead"]);
    assert_eq!(authority.org_unit_id, Some(sales.id));
    assert!(authority.is_tenant_admin);
    Ok(())
}

#[tokio::test]
async fn roles_in_other_tenants_do_not_leak() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let frank = create_user(&pool, 5, "frank").await?;
    let lead = create_role(&pool, 6, "division_lead", DataScope::UnitAndChild).await?;
    assign_roles(&pool, frank.id, 6, &[lead.id]).await?;

    assert!(resolver::resolve(&pool, frank.id, 5).await.is_err());
    assert!(resolver::resolve(&pool, frank.id, 6).await?.is_tenant_admin);
    Ok(())
}

#[tokio::test]
async fn targets_owned_by_other_tenants_are_not_resolved() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let mallory = create_user(&pool, 5, "mallory").await?;
    let platform = create_role(&pool, 0, "super_admin", DataScope::All).await?;
    let neighbour = create_role(&pool, 7, "t7_admin", DataScope::All).await?;

    // rows written straight into tenant 5, bypassing the HTTP guard
    assign_roles(&pool, mallory.id, 5, &[platform.id, neighbour.id]).await?;
    let err = resolver::resolve(&pool, mallory.id, 5).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let local = create_role(&pool, 5, "division_lead", DataScope::UnitAndChild).await?;
    assign_roles(&pool, mallory.id, 5, &[platform.id, local.id, neighbour.id]).await?;
    let elsewhere = user::create_org_unit(&pool, 7, None, "Elsewhere").await?;
    AssignmentStore::user_org_units()
        .replace(&pool, mallory.id, 5, &[AssignmentInput::target(elsewhere.id)], None)
        .await?;

    let authority = resolver::resolve(&pool, mallory.id, 5).await?;
    assert_eq!(authority.role_codes, vec!["division_lead"]);
    assert_eq!(authority.data_scope, DataScope::UnitAndChild);
    assert_eq!(authority.org_unit_id, None);
    assert!(!authority.is_platform_admin);
    Ok(())
}

#[tokio::test]
async fn assignment_targets_must_belong_to_the_tenant() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let local = create_role(&pool, 5, "division_lead", DataScope::UnitAndChild).await?;
    let platform = create_role(&pool, 0, "super_admin", DataScope::All).await?;
    let roles = AssignmentStore::user_roles();

    roles.ensure_targets_in_tenant(&pool, 5, &[local.id]).await?;
    let err = roles
        .ensure_targets_in_tenant(&pool, 5, &[local.id, platform.id])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert!(roles.ensure_targets_in_tenant(&pool, 5, &[9_999]).await.is_err());

    let hq = user::create_org_unit(&pool, 6, None, "HQ").await?;
    assert!(AssignmentStore::user_org_units()
        .ensure_targets_in_tenant(&pool, 5, &[hq.id])
        .await
        .is_err());
    AssignmentStore::user_org_units()
        .ensure_targets_in_tenant(&pool, 6, &[hq.id])
        .await?;
    Ok(())
}
