//! Time-bounded many-to-many assignments between a principal and its roles, org units
//! and positions.
//!
//! All six junction tables share one shape, so a single [`AssignmentStore`] serves them,
//! parameterized by [`AssignmentTable`]. Replacing a subject's assignments is
//! clean-then-insert inside one transaction; concurrent replaces for the same subject
//! resolve at the database (last commit wins).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db::{self, Tx};
use crate::errors::{db_error, AppError, AppResult};
use crate::models::assignment::{
    Assignment, AssignmentInput, AssignmentTable, RelationKind, SubjectKind,
};

pub const ASSIGNMENT_STATUS_ACTIVE: &str = "ACTIVE";

#[derive(Debug, Clone, Copy)]
pub struct AssignmentStore {
    table: AssignmentTable,
}

impl AssignmentStore {
    pub const fn new(subject: SubjectKind, relation: RelationKind) -> Self {
        Self {
            table: AssignmentTable::new(subject, relation),
        }
    }

    pub const fn user_roles() -> Self {
        Self::new(SubjectKind::User, RelationKind::Role)
    }

    pub const fn user_org_units() -> Self {
        Self::new(SubjectKind::User, RelationKind::OrgUnit)
    }

    pub const fn user_positions() -> Self {
        Self::new(SubjectKind::User, RelationKind::Position)
    }

    pub fn table(&self) -> AssignmentTable {
        self.table
    }

    /// Deletes every row for `(subject_id, tenant_id)`. Idempotent.
    pub async fn clean(&self, tx: &mut Tx<'_>, subject_id: u32, tenant_id: u32) -> AppResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ? AND tenant_id = ?",
            self.table,
            self.table.subject_column()
        );

        let result = sqlx::query(&sql)
            .bind(subject_id)
            .bind(tenant_id)
            .execute(&mut **tx)
            .await
            .map_err(db_error("clean assignments failed"))?;

        Ok(result.rows_affected())
    }

    /// Replaces the subject's rows in `tenant_id` with `rows`. An empty `rows` leaves
    /// the subject with no assignments.
    pub async fn assign(
        &self,
        tx: &mut Tx<'_>,
        subject_id: u32,
        tenant_id: u32,
        rows: &[AssignmentInput],
        assigned_by: Option<u32>,
    ) -> AppResult<()> {
        self.clean(tx, subject_id, tenant_id).await?;

        let rows = dedup_targets(rows);
        if rows.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} (tenant_id, {}, {}, status, is_primary, assigned_by, assigned_at, start_at, end_at, created_at) ",
            self.table,
            self.table.subject_column(),
            self.table.target_column()
        ));
        qb.push_values(rows.iter(), |mut b, row| {
            b.push_bind(tenant_id)
                .push_bind(subject_id)
                .push_bind(row.target_id)
                .push_bind(row_status(row).to_string())
                .push_bind(row.is_primary)
                .push_bind(assigned_by)
                .push_bind(now)
                .push_bind(row.start_at.unwrap_or(now))
                .push_bind(row.end_at)
                .push_bind(now);
        });

        qb.build()
            .execute(&mut **tx)
            .await
            .map_err(db_error("insert assignments failed"))?;

        tracing::debug!(
            table = %self.table,
            subject_id,
            tenant_id,
            count = rows.len(),
            "assignments replaced"
        );
        Ok(())
    }

    /// [`assign`](Self::assign) in its own transaction.
    pub async fn replace(
        &self,
        pool: &SqlitePool,
        subject_id: u32,
        tenant_id: u32,
        rows: &[AssignmentInput],
        assigned_by: Option<u32>,
    ) -> AppResult<()> {
        let mut tx = db::begin(pool).await?;
        let result = self.assign(&mut tx, subject_id, tenant_id, rows, assigned_by).await;
        db::finish(tx, result).await
    }

    /// Fails with `Forbidden` when any of `target_ids` is not a target owned by
    /// `tenant_id`. Unknown ids count as foreign.
    pub async fn ensure_targets_in_tenant(
        &self,
        pool: &SqlitePool,
        tenant_id: u32,
        target_ids: &[u32],
    ) -> AppResult<()> {
        let Some(table) = self.table.relation.target_table() else {
            return Ok(());
        };
        if target_ids.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT id FROM {table} WHERE tenant_id = "));
        qb.push_bind(tenant_id).push(" AND id IN (");
        let mut sep = qb.separated(", ");
        for id in target_ids {
            sep.push_bind(*id);
        }
        sep.push_unseparated(")");

        let owned: Vec<u32> = qb
            .build_query_scalar::<u32>()
            .fetch_all(pool)
            .await
            .map_err(db_error("check assignment targets failed"))?;

        let foreign: Vec<u32> = target_ids.iter().copied().filter(|id| !owned.contains(id)).collect();
        if foreign.is_empty() {
            Ok(())
        } else {
            tracing::warn!(table = %self.table, tenant_id, ?foreign, "assignment targets outside tenant");
            Err(AppError::forbidden(format!(
                "{table} {foreign:?} do not belong to tenant {tenant_id}"
            )))
        }
    }

    /// Target ids across all tenants. With `exclude_expired`, only rows whose `end_at`
    /// is unset or in the future.
    pub async fn list_ids(
        &self,
        pool: &SqlitePool,
        subject_id: u32,
        exclude_expired: bool,
    ) -> AppResult<Vec<u32>> {
        let sql = format!(
            "SELECT {}, end_at FROM {} WHERE {} = ? ORDER BY id",
            self.table.target_column(),
            self.table,
            self.table.subject_column()
        );

        let rows: Vec<(u32, Option<DateTime<Utc>>)> = sqlx::query_as(&sql)
            .bind(subject_id)
            .fetch_all(pool)
            .await
            .map_err(db_error("list assignment ids failed"))?;

        Ok(filter_active(rows, exclude_expired, Utc::now()))
    }

    /// Unexpired target ids of the subject within one tenant.
    pub async fn list_active_ids_in_tenant(
        &self,
        pool: &SqlitePool,
        subject_id: u32,
        tenant_id: u32,
    ) -> AppResult<Vec<u32>> {
        let sql = format!(
            "SELECT {}, end_at FROM {} WHERE {} = ? AND tenant_id = ? AND status = ? ORDER BY id",
            self.table.target_column(),
            self.table,
            self.table.subject_column()
        );

        let rows: Vec<(u32, Option<DateTime<Utc>>)> = sqlx::query_as(&sql)
            .bind(subject_id)
            .bind(tenant_id)
            .bind(ASSIGNMENT_STATUS_ACTIVE)
            .fetch_all(pool)
            .await
            .map_err(db_error("list active assignment ids failed"))?;

        Ok(filter_active(rows, true, Utc::now()))
    }

    pub async fn list(
        &self,
        pool: &SqlitePool,
        subject_id: u32,
        tenant_id: u32,
    ) -> AppResult<Vec<Assignment>> {
        let sql = format!(
            "SELECT id, tenant_id, {} AS subject_id, {} AS target_id, status, is_primary, assigned_by, assigned_at, start_at, end_at \
             FROM {} WHERE {} = ? AND tenant_id = ? ORDER BY id",
            self.table.subject_column(),
            self.table.target_column(),
            self.table,
            self.table.subject_column()
        );

        sqlx::query_as::<_, Assignment>(&sql)
            .bind(subject_id)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
            .map_err(db_error("list assignments failed"))
    }

    /// Deletes only the listed targets, leaving the subject's other rows alone.
    pub async fn remove(
        &self,
        pool: &SqlitePool,
        subject_id: u32,
        tenant_id: u32,
        target_ids: &[u32],
    ) -> AppResult<u64> {
        if target_ids.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "DELETE FROM {} WHERE {} = ",
            self.table,
            self.table.subject_column()
        ));
        qb.push_bind(subject_id)
            .push(" AND tenant_id = ")
            .push_bind(tenant_id)
            .push(format!(" AND {} IN (", self.table.target_column()));
        let mut ids = qb.separated(", ");
        for id in target_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");

        let result = qb
            .build()
            .execute(pool)
            .await
            .map_err(db_error("remove assignments failed"))?;

        Ok(result.rows_affected())
    }
}

/// First row per target id, in input order.
fn dedup_targets(rows: &[AssignmentInput]) -> Vec<&AssignmentInput> {
    let mut seen = HashSet::new();
    rows.iter().filter(|row| seen.insert(row.target_id)).collect()
}

fn row_status(row: &AssignmentInput) -> &str {
    row.status
        .as_deref()
        .filter(|status| !status.trim().is_empty())
        .unwrap_or(ASSIGNMENT_STATUS_ACTIVE)
}

fn filter_active(
    rows: Vec<(u32, Option<DateTime<Utc>>)>,
    exclude_expired: bool,
    now: DateTime<Utc>,
) -> Vec<u32> {
    rows.into_iter()
        .filter(|(_, end_at)| !exclude_expired || end_at.map_or(true, |end| end > now))
        .map(|(id, _)| id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expired_rows_are_dropped_only_when_asked() {
        let now = Utc::now();
        let rows = vec![
            (1, None),
            (2, Some(now - Duration::minutes(5))),
            (3, Some(now + Duration::minutes(5))),
        ];

        assert_eq!(filter_active(rows.clone(), true, now), vec![1, 3]);
        assert_eq!(filter_active(rows, false, now), vec![1, 2, 3]);
    }

    #[test]
    fn repeated_targets_keep_the_first_row() {
        let rows = vec![
            AssignmentInput {
                target_id: 4,
                is_primary: true,
                ..Default::default()
            },
            AssignmentInput::target(9),
            AssignmentInput::target(4),
        ];

        let kept = dedup_targets(&rows);
        assert_eq!(kept.iter().map(|row| row.target_id).collect::<Vec<_>>(), vec![4, 9]);
        assert!(kept[0].is_primary);
    }

    #[test]
    fn status_defaults_to_active() {
        let mut row = AssignmentInput::target(1);
        assert_eq!(row_status(&row), ASSIGNMENT_STATUS_ACTIVE);
        row.status = Some(" ".into());
        assert_eq!(row_status(&row), ASSIGNMENT_STATUS_ACTIVE);
        row.status = Some("SUSPENDED".into());
        assert_eq!(row_status(&row), "SUSPENDED");
    }
}
