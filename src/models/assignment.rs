use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::errors::AppError;

/// Principal side of a time-bounded assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    User,
    Membership,
}

impl SubjectKind {
    pub fn column(&self) -> &'static str {
        match self {
            SubjectKind::User => "user_id",
            SubjectKind::Membership => "membership_id",
        }
    }

    fn table_prefix(&self) -> &'static str {
        match self {
            SubjectKind::User => "user",
            SubjectKind::Membership => "membership",
        }
    }
}

impl FromStr for SubjectKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" | "user" => Ok(SubjectKind::User),
            "memberships" | "membership" => Ok(SubjectKind::Membership),
            other => Err(AppError::bad_request(format!("unknown subject kind: {other}"))),
        }
    }
}

/// Target side of a time-bounded assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Role,
    OrgUnit,
    Position,
}

impl RelationKind {
    pub fn column(&self) -> &'static str {
        match self {
            RelationKind::Role => "role_id",
            RelationKind::OrgUnit => "org_unit_id",
            RelationKind::Position => "position_id",
        }
    }

    fn table_suffix(&self) -> &'static str {
        match self {
            RelationKind::Role => "roles",
            RelationKind::OrgUnit => "org_units",
            RelationKind::Position => "positions",
        }
    }

    /// Tenant-owned table holding the targets. Positions live outside this schema.
    pub fn target_table(&self) -> Option<&'static str> {
        match self {
            RelationKind::Role => Some("roles"),
            RelationKind::OrgUnit => Some("org_units"),
            RelationKind::Position => None,
        }
    }
}

impl FromStr for RelationKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "roles" | "role" => Ok(RelationKind::Role),
            "org-units" | "org_units" | "org_unit" => Ok(RelationKind::OrgUnit),
            "positions" | "position" => Ok(RelationKind::Position),
            other => Err(AppError::bad_request(format!("unknown relation kind: {other}"))),
        }
    }
}

/// One of the six junction tables, e.g. `user_roles` or `membership_org_units`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentTable {
    pub subject: SubjectKind,
    pub relation: RelationKind,
}

impl AssignmentTable {
    pub const fn new(subject: SubjectKind, relation: RelationKind) -> Self {
        Self { subject, relation }
    }

    pub fn name(&self) -> String {
        format!("{}_{}", self.subject.table_prefix(), self.relation.table_suffix())
    }

    pub fn subject_column(&self) -> &'static str {
        self.subject.column()
    }

    pub fn target_column(&self) -> &'static str {
        self.relation.column()
    }
}

impl fmt::Display for AssignmentTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Row to insert on assign. `start_at` defaults to now and `status` to `ACTIVE` when
/// absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AssignmentInput {
    pub target_id: u32,
    pub status: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

impl AssignmentInput {
    pub fn target(target_id: u32) -> Self {
        Self {
            target_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Assignment {
    pub id: u32,
    pub tenant_id: u32,
    pub subject_id: u32,
    pub target_id: u32,
    pub status: String,
    pub is_primary: bool,
    pub assigned_by: Option<u32>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.end_at.map_or(true, |end| end > now)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReplaceAssignmentsRequest {
    pub tenant_id: u32,
    #[serde(default)]
    pub items: Vec<AssignmentInput>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RemoveAssignmentsRequest {
    pub tenant_id: u32,
    pub target_ids: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_follow_subject_and_relation() {
        let t = AssignmentTable::new(SubjectKind::User, RelationKind::Role);
        assert_eq!(t.name(), "user_roles");
        assert_eq!(t.target_column(), "role_id");

        let t = AssignmentTable::new(SubjectKind::Membership, RelationKind::OrgUnit);
        assert_eq!(t.name(), "membership_org_units");
        assert_eq!(t.subject_column(), "membership_id");
        assert_eq!(t.target_column(), "org_unit_id");
    }

    #[test]
    fn open_ended_assignment_is_active() {
        let now = Utc::now();
        let mut a = Assignment {
            id: 1,
            tenant_id: 5,
            subject_id: 1,
            target_id: 2,
            status: "ACTIVE".into(),
            is_primary: false,
            assigned_by: None,
            assigned_at: None,
            start_at: None,
            end_at: None,
        };
        assert!(a.is_active_at(now));
        a.end_at = Some(now - chrono::Duration::seconds(1));
        assert!(!a.is_active_at(now));
    }
}
