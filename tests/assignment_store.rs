mod common;

use anyhow::Result;
use chrono::{Duration, Utc};

use tenant_authz::models::assignment::{AssignmentInput, RelationKind, SubjectKind};
use tenant_authz::store::AssignmentStore;

use common::setup_pool;

fn targets(ids: &[u32]) -> Vec<AssignmentInput> {
    ids.iter().copied().map(AssignmentInput::target).collect()
}

#[tokio::test]
async fn replace_is_idempotent() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let store = AssignmentStore::user_roles();

    store.replace(&pool, 10, 5, &targets(&[1, 2]), Some(99)).await?;
    store.replace(&pool, 10, 5, &targets(&[1, 2]), Some(99)).await?;

    assert_eq!(store.list_ids(&pool, 10, false).await?, vec![1, 2]);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM user_roles WHERE user_id = 10")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 2);

    let rows = store.list(&pool, 10, 5).await?;
    assert!(rows.iter().all(|row| row.assigned_by == Some(99) && row.start_at.is_some()));
    Ok(())
}

#[tokio::test]
async fn empty_set_clears_the_tenant() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let store = AssignmentStore::user_roles();

    store.replace(&pool, 10, 5, &targets(&[1, 2, 3]), None).await?;
    store.replace(&pool, 10, 5, &[], None).await?;

    assert!(store.list_ids(&pool, 10, false).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn replace_only_touches_the_given_tenant() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let store = AssignmentStore::user_org_units();

    store.replace(&pool, 10, 5, &targets(&[1]), None).await?;
    store.replace(&pool, 10, 6, &targets(&[7]), None).await?;
    store.replace(&pool, 10, 5, &targets(&[2]), None).await?;

    assert_eq!(store.list_active_ids_in_tenant(&pool, 10, 5).await?, vec![2]);
    assert_eq!(store.list_active_ids_in_tenant(&pool, 10, 6).await?, vec![7]);
    assert_eq!(store.list_ids(&pool, 10, false).await?, vec![7, 2]);
    Ok(())
}

#[tokio::test]
async fn expired_rows_are_filtered_only_when_asked() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let store = AssignmentStore::user_positions();
    let now = Utc::now();

    let rows = vec![
        AssignmentInput {
            target_id: 1,
            end_at: Some(now - Duration::days(1)),
            ..Default::default()
        },
        AssignmentInput {
            target_id: 2,
            end_at: Some(now + Duration::days(30)),
            ..Default::default()
        },
        AssignmentInput::target(3),
    ];
    store.replace(&pool, 10, 5, &rows, None).await?;

    assert_eq!(store.list_ids(&pool, 10, false).await?, vec![1, 2, 3]);
    assert_eq!(store.list_ids(&pool, 10, true).await?, vec![2, 3]);
    assert_eq!(store.list_active_ids_in_tenant(&pool, 10, 5).await?, vec![2, 3]);
    Ok(())
}

#[tokio::test]
async fn remove_deletes_only_listed_targets() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let store = AssignmentStore::new(SubjectKind::Membership, RelationKind::Role);

    store.replace(&pool, 3, 5, &targets(&[1, 2, 3]), None).await?;
    let removed = store.remove(&pool, 3, 5, &[2, 42]).await?;

    assert_eq!(removed, 1);
    assert_eq!(store.list_ids(&pool, 3, true).await?, vec![1, 3]);
    assert_eq!(store.remove(&pool, 3, 5, &[]).await?, 0);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM user_roles")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 0, "membership rows must not land in user_roles");
    Ok(())
}

#[tokio::test]
async fn caller_status_is_kept_and_repeated_targets_collapse() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let store = AssignmentStore::user_roles();
    let rows = vec![
        AssignmentInput::target(3),
        AssignmentInput {
            target_id: 4,
            status: Some("SUSPENDED".to_string()),
            ..Default::default()
        },
        AssignmentInput::target(3),
    ];

    store.replace(&pool, 10, 5, &rows, None).await?;

    let listed = store.list(&pool, 10, 5).await?;
    let statuses: Vec<(u32, &str)> = listed.iter().map(|row| (row.target_id, row.status.as_str())).collect();
    assert_eq!(statuses, vec![(3, "ACTIVE"), (4, "SUSPENDED")]);

    // only ACTIVE rows take part in resolution
    assert_eq!(store.list_active_ids_in_tenant(&pool, 10, 5).await?, vec![3]);
    Ok(())
}
