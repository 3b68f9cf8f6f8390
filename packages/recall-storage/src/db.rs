use std::time::Duration;

use sqlx::{PgPool, Postgres, Transaction, postgres::PgPoolOptions};

use crate::{Error, Result, schema};

#[derive(Clone)]
pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &recall_config::Postgres) -> Result<Self> {
		let pool = PgPoolOptions::new()
			.max_connections(cfg.pool_max_conns)
			.acquire_timeout(Duration::from_secs(5))
			.connect(&cfg.dsn)
			.await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let lock_id: i64 = 7_310_542;
		// Advisory locks are held per connection. Use a single transaction so the lock is scoped to
		// one connection and automatically released when the transaction ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(lock_id).execute(&mut *tx).await?;

		for statement in schema::render_schema().split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}

	/// Resolves whether ANN queries should go through pgvector.
	///
	/// `"scan"` never uses it, `"auto"` uses it when the extension is already installed, and
	/// `"pgvector"` installs the extension and index or fails.
	pub async fn resolve_ann(&self, cfg: &recall_config::Vector) -> Result<bool> {
		match cfg.ann.as_str() {
			"scan" => Ok(false),
			"pgvector" => {
				self.ensure_ann_schema(cfg.dimensions).await.map_err(|err| {
					Error::AnnUnavailable(format!("Failed to install pgvector schema: {err}"))
				})?;

				Ok(true)
			},
			"auto" => {
				let installed: bool = sqlx::query_scalar(
					"SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'vector')",
				)
				.fetch_one(&self.pool)
				.await?;

				if installed && let Err(err) = self.ensure_ann_schema(cfg.dimensions).await {
					tracing::warn!(
						error = %err,
						"Failed to ensure ANN index. Queries will run unindexed."
					);
				}

				Ok(installed)
			},
			other => Err(Error::InvalidArgument(format!("Unknown ANN mode {other:?}."))),
		}
	}

	/// Opens a transaction whose statements are cancelled by the server after `timeout_ms`.
	pub async fn begin_bounded(&self, timeout_ms: u64) -> Result<Transaction<'_, Postgres>> {
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT set_config('statement_timeout', $1, true)")
			.bind(timeout_ms.to_string())
			.execute(&mut *tx)
			.await?;

		Ok(tx)
	}

	async fn ensure_ann_schema(&self, vector_dim: u32) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		for statement in schema::render_ann_schema(vector_dim).split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}

/// Commits `tx` when `result` is `Ok`, otherwise rolls it back before handing the error on.
pub async fn finish<T>(tx: Transaction<'_, Postgres>, result: Result<T>) -> Result<T> {
	match result {
		Ok(value) => {
			tx.commit().await?;

			Ok(value)
		},
		Err(err) => {
			if let Err(rollback_err) = tx.rollback().await {
				tracing::warn!(error = %rollback_err, "Rollback after failed query also failed.");
			}

			Err(err)
		},
	}
}
