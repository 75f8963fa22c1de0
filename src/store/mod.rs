//! SQLite-backed repositories. Each function logs its own driver errors and hands the
//! caller an [`AppError`] kind; callers do not log them again.

pub mod assignment;
pub mod permission;
pub mod permission_graph;
pub mod resource;
pub mod role;
pub mod role_metadata;
pub mod role_permission;
pub mod user;

use sqlx::sqlite::SqliteQueryResult;

use crate::errors::{AppError, AppResult};

pub use assignment::AssignmentStore;

/// Maps a unique-constraint violation to `Conflict`, anything else like [`db_error`].
///
/// [`db_error`]: crate::errors::db_error
pub(crate) fn unique_or_internal(
    operation: &'static str,
    conflict: &'static str,
) -> impl FnOnce(sqlx::Error) -> AppError {
    move |err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::conflict(conflict),
        _ => {
            tracing::error!(error = %err, "{operation}");
            AppError::internal(operation)
        }
    }
}

pub(crate) fn inserted_id(result: SqliteQueryResult) -> AppResult<u32> {
    u32::try_from(result.last_insert_rowid())
        .map_err(|_| AppError::internal("inserted id out of range"))
}
