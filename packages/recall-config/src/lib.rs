mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, EmbeddingProviderConfig, Postgres, Providers, Ranking, Search, SearchKeyword,
	SearchTimeouts, Service, Storage, Vector,
};

use std::{fs, path::Path};

pub const MAX_LIMIT: u32 = 100;
pub const MAX_TOP_K: u32 = 50;
/// One year.
pub const MAX_CACHE_TTL_SECONDS: u64 = 31_536_000;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.vector.dimensions {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.vector.dimensions."
				.to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if !matches!(cfg.storage.vector.ann.as_str(), "auto" | "pgvector" | "scan") {
		return Err(Error::Validation {
			message: "storage.vector.ann must be one of auto, pgvector, or scan.".to_string(),
		});
	}

	validate_search(cfg)?;
	validate_ranking(cfg)?;

	if !matches!(cfg.cache.backend.as_str(), "postgres" | "memory" | "off") {
		return Err(Error::Validation {
			message: "cache.backend must be one of postgres, memory, or off.".to_string(),
		});
	}
	if cfg.cache.ttl_seconds == 0 {
		return Err(Error::Validation {
			message: "cache.ttl_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.ttl_seconds > MAX_CACHE_TTL_SECONDS {
		return Err(Error::Validation {
			message: format!("cache.ttl_seconds must be at most {MAX_CACHE_TTL_SECONDS}."),
		});
	}
	if cfg.cache.backend == "memory" && cfg.cache.max_entries == 0 {
		return Err(Error::Validation {
			message: "cache.max_entries must be greater than zero for the memory backend."
				.to_string(),
		});
	}

	if let Some(max) = cfg.cache.max_payload_bytes
		&& max == 0
	{
		return Err(Error::Validation {
			message: "cache.max_payload_bytes must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_search(cfg: &Config) -> Result<()> {
	let search = &cfg.search;

	if !(1..=MAX_LIMIT).contains(&search.default_limit) {
		return Err(Error::Validation {
			message: format!("search.default_limit must be in the range 1-{MAX_LIMIT}."),
		});
	}
	if !(1..=MAX_TOP_K).contains(&search.default_top_k) {
		return Err(Error::Validation {
			message: format!("search.default_top_k must be in the range 1-{MAX_TOP_K}."),
		});
	}
	if !search.default_threshold.is_finite() || !(0.0..=1.0).contains(&search.default_threshold)
	{
		return Err(Error::Validation {
			message: "search.default_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if search.keyword.overfetch_multiplier == 0 {
		return Err(Error::Validation {
			message: "search.keyword.overfetch_multiplier must be greater than zero.".to_string(),
		});
	}
	if search.keyword.overfetch_min == 0 {
		return Err(Error::Validation {
			message: "search.keyword.overfetch_min must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("search.keyword.phrase_bonus", search.keyword.phrase_bonus),
		("search.keyword.min_ratio", search.keyword.min_ratio),
	] {
		if !value.is_finite() || !(0.0..=1.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}
	for (label, value) in [
		("search.timeouts.embedding_ms", search.timeouts.embedding_ms),
		("search.timeouts.store_ms", search.timeouts.store_ms),
		("search.timeouts.cache_ms", search.timeouts.cache_ms),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	Ok(())
}

fn validate_ranking(cfg: &Config) -> Result<()> {
	let ranking = &cfg.ranking;

	for (label, value) in [
		("ranking.vector_weight", ranking.vector_weight),
		("ranking.keyword_weight", ranking.keyword_weight),
		("ranking.hybrid_boost", ranking.hybrid_boost),
		("ranking.tag_boost", ranking.tag_boost),
	] {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if !(0.0..=1.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if ranking.vector_weight + ranking.keyword_weight <= 0.0 {
		return Err(Error::Validation {
			message: "ranking.vector_weight and ranking.keyword_weight must not both be zero."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.storage.vector.ann = cfg.storage.vector.ann.trim().to_ascii_lowercase();
	cfg.cache.backend = cfg.cache.backend.trim().to_ascii_lowercase();

	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}

	let embedding = &mut cfg.providers.embedding;

	if embedding.api_base.ends_with('/') && embedding.path.starts_with('/') {
		embedding.api_base = embedding.api_base.trim_end_matches('/').to_string();
	}
}
