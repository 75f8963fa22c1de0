use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::errors::{AppError, AppResult};

pub async fn init() -> anyhow::Result<SqlitePool> {
	let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;

	let pool = SqlitePoolOptions::new()
		.max_connections(10)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(10))
		.connect(&database_url)
		.await
		.context("failed to connect to database")?;

	sqlx::migrate!()
		.run(&pool)
		.await
		.context("failed to run migrations")?;

	Ok(pool)
}

pub type Tx<'c> = Transaction<'c, Sqlite>;

pub async fn begin(pool: &SqlitePool) -> AppResult<Tx<'static>> {
	pool.begin().await.map_err(|err| {
		tracing::error!(error = %err, "start transaction failed");
		AppError::internal("start transaction failed")
	})
}

/// Commits `tx` when `result` is Ok, rolls it back otherwise.
///
/// A failed rollback is logged on its own line and the original error is returned untouched.
pub async fn finish<T>(tx: Tx<'_>, result: AppResult<T>) -> AppResult<T> {
	match result {
		Ok(value) => {
			tx.commit().await.map_err(|err| {
				tracing::error!(error = %err, "transaction commit failed");
				AppError::internal("transaction commit failed")
			})?;
			Ok(value)
		}
		Err(err) => {
			if let Err(rollback_err) = tx.rollback().await {
				tracing::error!(error = %rollback_err, "transaction rollback failed");
			}
			Err(err)
		}
	}
}
