pub mod cache;
pub mod fusion;
pub mod retrieval;
pub mod text;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, RecallService, Result};
use cache::{CachedItems, cache_key_prefix};
use fusion::FusionWeights;
use recall_config::{MAX_LIMIT, MAX_TOP_K};
use retrieval::{Candidate, KeywordSearch, VectorSearch};

pub const MAX_QUERY_CHARS: usize = 1_000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	pub project_id: Option<Uuid>,
	pub tags: Option<Vec<String>>,
	pub limit: Option<u32>,
	pub similarity_threshold: Option<f32>,
	pub top_k: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
	Vector,
	Keyword,
	Hybrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
	pub id: Uuid,
	pub content: String,
	pub summary: Option<String>,
	pub tags: Vec<String>,
	pub project_id: Uuid,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	pub score: f32,
	pub rank: u32,
	pub source: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
	pub items: Vec<RankedResult>,
	pub query: String,
	pub total_results: usize,
	pub execution_time_ms: u64,
	pub cache_hit: bool,
}

/// A request with defaults applied and bounds checked.
#[derive(Debug, Clone)]
struct ResolvedRequest {
	query: String,
	project_id: Option<Uuid>,
	tags: Vec<String>,
	limit: u32,
	threshold: f32,
	top_k: u32,
}

impl RecallService {
	/// Runs a hybrid search.
	///
	/// Only request validation fails the call. Embedding, store, and cache failures degrade the
	/// result and are logged.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let started = Instant::now();
		let request = self.resolve_request(req)?;
		let weights = FusionWeights::from(&self.cfg.ranking);
		let cache_key = match cache::build_search_cache_key(
			&request.query,
			request.project_id,
			&request.tags,
			request.limit,
		) {
			Ok(key) => Some(key),
			Err(err) => {
				tracing::warn!(error = %err, "Cache key build failed.");

				None
			},
		};

		if let Some(key) = cache_key.as_deref()
			&& let Some(items) = self.read_cache(key, &weights).await
		{
			return Ok(build_response(request.query, items, started, true));
		}

		let (vector, keyword) =
			tokio::join!(self.vector_candidates(&request), self.keyword_candidates(&request));
		let (vector, vector_failed) = absorb_retrieval("vector", vector);
		let (keyword, keyword_failed) = absorb_retrieval("keyword", keyword);

		if vector_failed && keyword_failed {
			tracing::warn!(
				degradation = "retrieval_unavailable",
				"Both retrieval paths failed. Returning an empty result."
			);
		}

		tracing::debug!(
			vector_candidates = vector.len(),
			keyword_candidates = keyword.len(),
			"Retrieval finished."
		);

		let items = fusion::rank(vector, keyword, &request.tags, request.top_k, &weights);

		if let Some(key) = cache_key.as_deref() {
			self.write_cache(key, &items).await;
		}

		Ok(build_response(request.query, items, started, false))
	}

	fn resolve_request(&self, req: SearchRequest) -> Result<ResolvedRequest> {
		let defaults = &self.cfg.search;
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidQuery { message: "Query must be non-empty.".to_string() });
		}
		if query.chars().count() > MAX_QUERY_CHARS {
			return Err(Error::InvalidRequest {
				message: format!("Query must be at most {MAX_QUERY_CHARS} characters."),
			});
		}

		let limit = req.limit.unwrap_or(defaults.default_limit);

		if !(1..=MAX_LIMIT).contains(&limit) {
			return Err(Error::InvalidRequest {
				message: format!("limit must be in the range 1-{MAX_LIMIT}."),
			});
		}

		let top_k = req.top_k.unwrap_or(defaults.default_top_k);

		if !(1..=MAX_TOP_K).contains(&top_k) {
			return Err(Error::InvalidRequest {
				message: format!("top_k must be in the range 1-{MAX_TOP_K}."),
			});
		}

		let threshold = req.similarity_threshold.unwrap_or(defaults.default_threshold);

		if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
			return Err(Error::InvalidRequest {
				message: "similarity_threshold must be in the range 0.0-1.0.".to_string(),
			});
		}

		let tags = req
			.tags
			.unwrap_or_default()
			.into_iter()
			.map(|tag| tag.trim().to_string())
			.filter(|tag| !tag.is_empty())
			.collect();

		Ok(ResolvedRequest {
			query: query.to_string(),
			project_id: req.project_id,
			tags,
			limit,
			threshold,
			top_k,
		})
	}

	async fn vector_candidates(&self, request: &ResolvedRequest) -> Result<Vec<Candidate>> {
		if self.cfg.search.skip_vector_for_simple_queries
			&& !text::needs_semantic_search(&request.query)
		{
			tracing::debug!("Simple query. Skipping vector retrieval.");

			return Ok(Vec::new());
		}

		let embedding = self.embed_query(&request.query).await;
		let search = VectorSearch {
			embedding: embedding.as_deref(),
			project_id: request.project_id,
			tags: &request.tags,
			limit: request.limit,
			threshold: request.threshold,
		};

		retrieval::find_by_vector(self.store.as_ref(), search, self.store_timeout()).await
	}

	async fn keyword_candidates(&self, request: &ResolvedRequest) -> Result<Vec<Candidate>> {
		let search = KeywordSearch {
			query: &request.query,
			project_id: request.project_id,
			limit: request.limit,
		};

		retrieval::find_by_keyword(
			self.store.as_ref(),
			search,
			&self.cfg.search.keyword,
			self.store_timeout(),
		)
		.await
	}

	/// The query embedding, or `None` when the provider cannot supply a usable one.
	async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let texts = [query.to_string()];
		let timeout = Duration::from_millis(self.cfg.search.timeouts.embedding_ms);
		let result = retrieval::bounded("Embedding request", timeout, async {
			self.providers.embedding.embed(cfg, &texts).await.map_err(Error::from)
		})
		.await;
		let vector = match result {
			Ok(vectors) => vectors.into_iter().next(),
			Err(err) => {
				tracing::warn!(
					error = %err,
					degradation = "embedding",
					"Embedding failed. Continuing with keyword retrieval only."
				);

				return None;
			},
		};
		let expected = self.cfg.storage.vector.dimensions as usize;

		match vector {
			Some(vector) if !vector.is_empty() && vector.len() == expected => Some(vector),
			Some(vector) => {
				tracing::warn!(
					degradation = "embedding",
					dimensions = vector.len(),
					expected,
					"Embedding has unexpected dimensionality. Continuing with keyword retrieval only."
				);

				None
			},
			None => {
				tracing::warn!(
					degradation = "embedding",
					"Embedding provider returned no vectors. Continuing with keyword retrieval only."
				);

				None
			},
		}
	}

	async fn read_cache(&self, key: &str, weights: &FusionWeights) -> Option<Vec<RankedResult>> {
		let cache = self.cache.as_ref()?;
		let read = cache.get(key);
		let value = match retrieval::bounded("Cache read", self.cache_timeout(), read).await {
			Ok(Some(value)) => value,
			Ok(None) => {
				tracing::debug!(
					cache_key_prefix = cache_key_prefix(key),
					hit = false,
					"Cache miss."
				);

				return None;
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					degradation = "cache_unavailable",
					cache_key_prefix = cache_key_prefix(key),
					"Cache read failed."
				);

				return None;
			},
		};

		match cache::decode_payload(value, weights) {
			Ok(CachedItems { items, repaired }) => {
				tracing::debug!(
					cache_key_prefix = cache_key_prefix(key),
					hit = true,
					repaired,
					item_count = items.len(),
					"Cache hit."
				);

				if repaired {
					tracing::info!(
						cache_key_prefix = cache_key_prefix(key),
						"Repaired legacy cache entry."
					);

					self.write_cache(key, &items).await;
				}

				Some(items)
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_key_prefix = cache_key_prefix(key),
					"Cache payload decode failed. Treating as a miss."
				);

				None
			},
		}
	}

	/// Best effort. Failures are logged and otherwise ignored.
	async fn write_cache(&self, key: &str, items: &[RankedResult]) {
		let Some(cache) = self.cache.as_ref() else { return };
		let payload = match cache::encode_payload(items) {
			Ok(value) => value,
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_key_prefix = cache_key_prefix(key),
					"Cache payload encode failed."
				);

				return;
			},
		};

		if let Some(max) = self.cfg.cache.max_payload_bytes {
			let size = payload_size(&payload);

			if size > max {
				tracing::warn!(
					cache_key_prefix = cache_key_prefix(key),
					payload_size = size,
					max_payload_bytes = max,
					"Cache payload skipped due to size."
				);

				return;
			}
		}

		let ttl = Duration::from_secs(self.cfg.cache.ttl_seconds);
		let write = cache.set(key, payload, ttl);

		match retrieval::bounded("Cache write", self.cache_timeout(), write).await {
			Ok(()) => {
				tracing::debug!(
					cache_key_prefix = cache_key_prefix(key),
					ttl_seconds = self.cfg.cache.ttl_seconds,
					"Cache stored."
				);
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					degradation = "cache_unavailable",
					cache_key_prefix = cache_key_prefix(key),
					"Cache write failed."
				);
			},
		}
	}

	fn store_timeout(&self) -> Duration {
		Duration::from_millis(self.cfg.search.timeouts.store_ms)
	}

	fn cache_timeout(&self) -> Duration {
		Duration::from_millis(self.cfg.search.timeouts.cache_ms)
	}
}

fn absorb_retrieval(
	path: &'static str,
	result: Result<Vec<Candidate>>,
) -> (Vec<Candidate>, bool) {
	match result {
		Ok(candidates) => (candidates, false),
		Err(err) => {
			tracing::warn!(
				error = %err,
				degradation = "retrieval_unavailable",
				path,
				"Retrieval path failed. Continuing without it."
			);

			(Vec::new(), true)
		},
	}
}

fn payload_size(payload: &Value) -> u64 {
	serde_json::to_vec(payload).map(|raw| raw.len() as u64).unwrap_or(u64::MAX)
}

fn build_response(
	query: String,
	items: Vec<RankedResult>,
	started: Instant,
	cache_hit: bool,
) -> SearchResponse {
	SearchResponse {
		total_results: items.len(),
		items,
		query,
		execution_time_ms: started.elapsed().as_millis() as u64,
		cache_hit,
	}
}
