use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;

use crate::{BoxFuture, Error, RecordStore, Result, ResultCache};
use recall_storage::{
	cache,
	db::Db,
	models::{MemoryMatch, MemoryRecord},
	queries::{self, AnnQuery, RecordScope, TextMatchQuery},
};

/// Postgres-backed [`RecordStore`].
///
/// Every query runs in its own transaction with a local `statement_timeout`.
#[derive(Clone)]
pub struct PgRecordStore {
	db: Db,
	ann_enabled: bool,
	statement_timeout_ms: u64,
}
impl PgRecordStore {
	pub fn new(db: Db, ann_enabled: bool, statement_timeout_ms: u64) -> Self {
		Self { db, ann_enabled, statement_timeout_ms }
	}
}
impl RecordStore for PgRecordStore {
	fn supports_ann(&self) -> bool {
		self.ann_enabled
	}

	fn ann_search<'a>(&'a self, query: AnnQuery<'a>) -> BoxFuture<'a, Result<Vec<MemoryMatch>>> {
		Box::pin(async move {
			Ok(queries::ann_search(&self.db, query, self.statement_timeout_ms).await?)
		})
	}

	fn scan_embedded<'a>(
		&'a self,
		scope: RecordScope<'a>,
	) -> BoxFuture<'a, Result<Vec<MemoryRecord>>> {
		Box::pin(async move {
			Ok(queries::scan_embedded(&self.db, scope, self.statement_timeout_ms).await?)
		})
	}

	fn text_match<'a>(
		&'a self,
		query: TextMatchQuery<'a>,
	) -> BoxFuture<'a, Result<Vec<MemoryRecord>>> {
		Box::pin(async move {
			Ok(queries::text_match(&self.db, query, self.statement_timeout_ms).await?)
		})
	}
}

/// [`ResultCache`] over the `search_cache` table.
#[derive(Clone)]
pub struct PgResultCache {
	db: Db,
}
impl PgResultCache {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl ResultCache for PgResultCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
		Box::pin(async move {
			cache::fetch_payload(&self.db, key, OffsetDateTime::now_utc())
				.await
				.map_err(|err| Error::Cache { message: err.to_string() })
		})
	}

	fn set<'a>(&'a self, key: &'a str, value: Value, ttl: Duration) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let expires_at = expiry_after(now, ttl)?;

			cache::store_payload(&self.db, key, &value, now, expires_at)
				.await
				.map_err(|err| Error::Cache { message: err.to_string() })
		})
	}
}

fn expiry_after(now: OffsetDateTime, ttl: Duration) -> Result<OffsetDateTime> {
	time::Duration::try_from(ttl)
		.ok()
		.and_then(|ttl| now.checked_add(ttl))
		.ok_or_else(|| Error::Cache {
			message: format!("Cache TTL of {} s is out of range.", ttl.as_secs()),
		})
}
