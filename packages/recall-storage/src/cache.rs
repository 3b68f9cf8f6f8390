use serde_json::Value;
use time::OffsetDateTime;

use crate::{Result, db::Db};

/// Returns the live payload stored under `key` and records the access.
pub async fn fetch_payload(db: &Db, key: &str, now: OffsetDateTime) -> Result<Option<Value>> {
	let payload: Option<Value> = sqlx::query_scalar(
		"\
UPDATE search_cache
SET last_accessed_at = $1, hit_count = hit_count + 1
WHERE cache_key = $2 AND expires_at > $1
RETURNING payload",
	)
	.bind(now)
	.bind(key)
	.fetch_optional(&db.pool)
	.await?;

	Ok(payload)
}

pub async fn store_payload(
	db: &Db,
	key: &str,
	payload: &Value,
	now: OffsetDateTime,
	expires_at: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO search_cache (cache_key, payload, created_at, last_accessed_at, expires_at, hit_count)
VALUES ($1, $2, $3, $3, $4, 0)
ON CONFLICT (cache_key) DO UPDATE
SET
	payload = EXCLUDED.payload,
	created_at = EXCLUDED.created_at,
	last_accessed_at = EXCLUDED.last_accessed_at,
	expires_at = EXCLUDED.expires_at,
	hit_count = 0",
	)
	.bind(key)
	.bind(payload)
	.bind(now)
	.bind(expires_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Deletes expired entries and returns how many were removed.
pub async fn purge_expired(db: &Db, now: OffsetDateTime) -> Result<u64> {
	let result = sqlx::query("DELETE FROM search_cache WHERE expires_at <= $1")
		.bind(now)
		.execute(&db.pool)
		.await?;

	Ok(result.rows_affected())
}
