pub mod memory_cache;
pub mod search;
pub mod store;

mod error;

pub use error::{Error, Result};
pub use memory_cache::MemoryResultCache;
pub use search::{Provenance, RankedResult, SearchRequest, SearchResponse};
pub use store::{PgRecordStore, PgResultCache};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use serde_json::Value;

use recall_config::{Config, EmbeddingProviderConfig};
use recall_providers::embedding;
use recall_storage::{
	db::Db,
	models::{MemoryMatch, MemoryRecord},
	queries::{AnnQuery, RecordScope, TextMatchQuery},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

/// Read access to stored memories.
///
/// Implementations must leave no transaction open when a query fails.
pub trait RecordStore
where
	Self: Send + Sync,
{
	/// Whether [`RecordStore::ann_search`] is backed by a native nearest-neighbour index.
	fn supports_ann(&self) -> bool;

	fn ann_search<'a>(&'a self, query: AnnQuery<'a>) -> BoxFuture<'a, Result<Vec<MemoryMatch>>>;

	fn scan_embedded<'a>(
		&'a self,
		scope: RecordScope<'a>,
	) -> BoxFuture<'a, Result<Vec<MemoryRecord>>>;

	fn text_match<'a>(
		&'a self,
		query: TextMatchQuery<'a>,
	) -> BoxFuture<'a, Result<Vec<MemoryRecord>>>;
}

pub trait ResultCache
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>>;

	fn set<'a>(&'a self, key: &'a str, value: Value, ttl: Duration) -> BoxFuture<'a, Result<()>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

pub struct RecallService {
	pub cfg: Config,
	pub store: Arc<dyn RecordStore>,
	pub cache: Option<Arc<dyn ResultCache>>,
	pub providers: Providers,
}
impl RecallService {
	pub fn new(
		cfg: Config,
		store: Arc<dyn RecordStore>,
		cache: Option<Arc<dyn ResultCache>>,
	) -> Self {
		Self { cfg, store, cache, providers: Providers::default() }
	}

	pub fn with_providers(
		cfg: Config,
		store: Arc<dyn RecordStore>,
		cache: Option<Arc<dyn ResultCache>>,
		providers: Providers,
	) -> Self {
		Self { cfg, store, cache, providers }
	}

	/// Wires the Postgres store and the cache backend named in `cfg.cache.backend`.
	pub fn connect(cfg: Config, db: Db, ann_enabled: bool) -> Self {
		let store =
			Arc::new(PgRecordStore::new(db.clone(), ann_enabled, cfg.search.timeouts.store_ms));
		let cache = build_result_cache(&cfg.cache, &db);

		Self::new(cfg, store, cache)
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

/// Returns `None` for the `"off"` backend.
pub fn build_result_cache(cfg: &recall_config::Cache, db: &Db) -> Option<Arc<dyn ResultCache>> {
	match cfg.backend.as_str() {
		"postgres" => Some(Arc::new(PgResultCache::new(db.clone()))),
		"memory" => Some(Arc::new(MemoryResultCache::new(cfg.max_entries))),
		_ => None,
	}
}
