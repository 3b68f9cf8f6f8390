//! In-process [`ResultCache`] backed by moka.

use std::time::{Duration, Instant};

use moka::{Expiry, sync::Cache};
use serde_json::Value;

use crate::{BoxFuture, Result, ResultCache};

#[derive(Debug, Clone)]
struct CachedPayload {
	value: Value,
	ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PayloadExpiry;
impl Expiry<String, CachedPayload> for PayloadExpiry {
	fn expire_after_create(
		&self,
		_key: &String,
		value: &CachedPayload,
		_created_at: Instant,
	) -> Option<Duration> {
		Some(value.ttl)
	}

	fn expire_after_update(
		&self,
		_key: &String,
		value: &CachedPayload,
		_updated_at: Instant,
		_duration_until_expiry: Option<Duration>,
	) -> Option<Duration> {
		Some(value.ttl)
	}
}

/// Bounded, process-local search cache. Entries are evicted by TinyLFU once `max_entries` is
/// reached.
pub struct MemoryResultCache {
	cache: Cache<String, CachedPayload>,
}
impl MemoryResultCache {
	pub fn new(max_entries: u64) -> Self {
		let cache = Cache::builder().max_capacity(max_entries).expire_after(PayloadExpiry).build();

		Self { cache }
	}
}
impl ResultCache for MemoryResultCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
		Box::pin(async move { Ok(self.cache.get(key).map(|entry| entry.value)) })
	}

	fn set<'a>(&'a self, key: &'a str, value: Value, ttl: Duration) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.cache.insert(key.to_string(), CachedPayload { value, ttl });

			Ok(())
		})
	}
}
