use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub ranking: Ranking,
	#[serde(default)]
	pub cache: Cache,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub vector: Vector,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vector {
	pub dimensions: u32,
	/// One of "auto", "pgvector", or "scan". "auto" probes for the pgvector extension at
	/// startup.
	#[serde(default = "default_ann_mode")]
	pub ann: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Search {
	pub default_limit: u32,
	pub default_threshold: f32,
	pub default_top_k: u32,
	/// Skips the embedding request and vector retrieval for short, non-conceptual queries.
	pub skip_vector_for_simple_queries: bool,
	pub keyword: SearchKeyword,
	pub timeouts: SearchTimeouts,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			default_limit: 10,
			default_threshold: 0.5,
			default_top_k: 10,
			skip_vector_for_simple_queries: false,
			keyword: SearchKeyword::default(),
			timeouts: SearchTimeouts::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchKeyword {
	pub overfetch_multiplier: u32,
	pub overfetch_min: u32,
	pub phrase_bonus: f32,
	pub min_matched_tokens: u32,
	pub min_ratio: f32,
}
impl Default for SearchKeyword {
	fn default() -> Self {
		Self {
			overfetch_multiplier: 5,
			overfetch_min: 50,
			phrase_bonus: 0.2,
			min_matched_tokens: 1,
			min_ratio: 0.0,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchTimeouts {
	pub embedding_ms: u64,
	pub store_ms: u64,
	pub cache_ms: u64,
}
impl Default for SearchTimeouts {
	fn default() -> Self {
		Self { embedding_ms: 10_000, store_ms: 5_000, cache_ms: 500 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ranking {
	pub vector_weight: f32,
	pub keyword_weight: f32,
	/// Added when a memory is returned by both retrieval paths.
	pub hybrid_boost: f32,
	/// Added when a memory carries one of the requested tags.
	pub tag_boost: f32,
}
impl Default for Ranking {
	fn default() -> Self {
		Self { vector_weight: 0.7, keyword_weight: 0.3, hybrid_boost: 0.1, tag_boost: 0.15 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Cache {
	/// One of "postgres", "memory", or "off".
	pub backend: String,
	pub ttl_seconds: u64,
	pub max_entries: u64,
	pub max_payload_bytes: Option<u64>,
}
impl Default for Cache {
	fn default() -> Self {
		Self {
			backend: "memory".to_string(),
			ttl_seconds: 3_600,
			max_entries: 10_000,
			max_payload_bytes: None,
		}
	}
}

fn default_ann_mode() -> String {
	"auto".to_string()
}
